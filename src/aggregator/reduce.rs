use crate::{archive::Writable, types::NativeScalar};
use std::{fmt::Debug, marker::PhantomData};

/// A fold with an identity.
///
/// Workers merge partial values in ascending worker id order, so a fold that
/// is not commutative still gives reproducible results. Associativity and
/// commutativity are assumed by callers that care about the exact value.
pub trait ReduceOp: Send + 'static {
    type Value: Writable + Clone + Debug + Send + 'static;

    fn identity(&self) -> Self::Value;

    fn fold(&self, acc: Self::Value, value: Self::Value) -> Self::Value;
}

macro_rules! native_op {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug)]
        pub struct $name<T>(PhantomData<fn() -> T>);

        impl<T> $name<T> {
            pub fn new() -> Self {
                Self(PhantomData)
            }
        }

        impl<T> Default for $name<T> {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

native_op!(Sum, "Sums values; integers wrap on overflow.");
native_op!(Min, "Keeps the smallest value.");
native_op!(Max, "Keeps the largest value.");
native_op!(Overwrite, "Keeps the last value folded in.");

impl<T: NativeScalar> ReduceOp for Sum<T> {
    type Value = T;

    fn identity(&self) -> T {
        T::ZERO
    }

    fn fold(&self, acc: T, value: T) -> T {
        acc.add(value)
    }
}

impl<T: NativeScalar> ReduceOp for Min<T> {
    type Value = T;

    fn identity(&self) -> T {
        T::HIGHEST
    }

    fn fold(&self, acc: T, value: T) -> T {
        if value < acc {
            value
        } else {
            acc
        }
    }
}

impl<T: NativeScalar> ReduceOp for Max<T> {
    type Value = T;

    fn identity(&self) -> T {
        T::LOWEST
    }

    fn fold(&self, acc: T, value: T) -> T {
        if value > acc {
            value
        } else {
            acc
        }
    }
}

impl<T: NativeScalar> ReduceOp for Overwrite<T> {
    type Value = T;

    fn identity(&self) -> T {
        T::ZERO
    }

    fn fold(&self, _acc: T, value: T) -> T {
        value
    }
}

#[derive(Debug, Default)]
pub struct BooleanAnd;

impl ReduceOp for BooleanAnd {
    type Value = bool;

    fn identity(&self) -> bool {
        true
    }

    fn fold(&self, acc: bool, value: bool) -> bool {
        acc && value
    }
}

#[derive(Debug, Default)]
pub struct BooleanOr;

impl ReduceOp for BooleanOr {
    type Value = bool;

    fn identity(&self) -> bool {
        false
    }

    fn fold(&self, acc: bool, value: bool) -> bool {
        acc || value
    }
}
