use crate::core::*;

/// An integer atom `var + shift`: the simplest affine view of a variable.
///
/// Constants are represented over [`VarRef::ZERO`].
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct IAtom {
    pub var: VarRef,
    pub shift: IntCst,
}

impl IAtom {
    pub fn new(var: VarRef, shift: IntCst) -> IAtom {
        IAtom { var, shift }
    }

    /// A literal stating `self >= value`.
    pub fn ge_lit(self, value: IntCst) -> Lit {
        Lit::geq(self.var, value - self.shift)
    }

    /// A literal stating `self <= value`.
    pub fn le_lit(self, value: IntCst) -> Lit {
        Lit::leq(self.var, value - self.shift)
    }

    pub fn gt_lit(self, value: IntCst) -> Lit {
        self.ge_lit(value + 1)
    }

    pub fn lt_lit(self, value: IntCst) -> Lit {
        self.le_lit(value - 1)
    }

    pub fn plus(self, delta: IntCst) -> IAtom {
        IAtom::new(self.var, self.shift + delta)
    }
}

impl From<VarRef> for IAtom {
    fn from(var: VarRef) -> Self {
        IAtom::new(var, 0)
    }
}

impl From<IntCst> for IAtom {
    fn from(value: IntCst) -> Self {
        IAtom::new(VarRef::ZERO, value)
    }
}

impl std::fmt::Debug for IAtom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.var == VarRef::ZERO {
            write!(f, "{}", self.shift)
        } else if self.shift == 0 {
            write!(f, "{:?}", self.var)
        } else {
            write!(f, "{:?}{:+}", self.var, self.shift)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifted_literals() {
        let v = VarRef::from_u32(4);
        let a = IAtom::new(v, 3); // a = v + 3
        assert_eq!(a.ge_lit(5), Lit::geq(v, 2));
        assert_eq!(a.le_lit(5), Lit::leq(v, 2));
        assert_eq!(a.gt_lit(5), Lit::geq(v, 3));
        assert_eq!(a.lt_lit(5), Lit::leq(v, 1));
        assert_eq!(a.plus(-3).ge_lit(5), Lit::geq(v, 5));
    }
}
