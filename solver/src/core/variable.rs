use std::fmt::Debug;

use crate::core::{IntCst, Lit};
use crate::create_ref_type;

create_ref_type!(VarRef);

impl Debug for VarRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "var{:?}", self.to_u32())
    }
}

impl VarRef {
    /// A reserved variable that is always equal to 0, the first representable `VarRef`.
    ///
    /// It is not treated separately from other variables: producers of `VarRef`
    /// are responsible for only emitting it with the domain `[0, 0]`.
    pub const ZERO: VarRef = VarRef::from_u32(0);

    pub fn leq(self, i: IntCst) -> Lit {
        Lit::leq(self, i)
    }
    pub fn lt(self, i: IntCst) -> Lit {
        Lit::lt(self, i)
    }
    pub fn geq(self, i: IntCst) -> Lit {
        Lit::geq(self, i)
    }
    pub fn gt(self, i: IntCst) -> Lit {
        Lit::gt(self, i)
    }
}
