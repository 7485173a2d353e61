use crate::core::*;

/// A positive or negative view of an integer variable.
/// The type has dense integer values and can be used as an index in an array.
///
/// It is represented on 32 bits where:
///  - the 31 most significant bits identify the variable
///  - the least significant bit gives the sign: positive (1) or negative (0).
///
/// Invariant: `-(-v) == v`, and the upper bound of the negative view is the
/// negated lower bound of the positive one.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct SignedVar(u32);

impl SignedVar {
    #[inline]
    pub const fn from_raw(id: u32) -> Self {
        SignedVar(id)
    }

    pub const fn to_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn plus(v: VarRef) -> Self {
        SignedVar((v.to_u32() << 1) + 1)
    }

    #[inline]
    pub const fn minus(v: VarRef) -> Self {
        SignedVar(v.to_u32() << 1)
    }

    /// The opposite view of the same variable.
    ///
    /// ```
    /// use vela::core::*;
    /// let var = VarRef::from_u32(1);
    /// assert_eq!(SignedVar::minus(var).neg(), SignedVar::plus(var));
    /// assert_eq!(SignedVar::plus(var).neg(), SignedVar::minus(var));
    /// ```
    #[inline]
    pub const fn neg(self) -> Self {
        SignedVar(self.0 ^ 0x1)
    }

    #[inline]
    pub const fn is_minus(self) -> bool {
        (self.0 & 0x1) == 0
    }

    #[inline]
    pub const fn is_plus(self) -> bool {
        (self.0 & 0x1) == 1
    }

    #[inline]
    pub fn variable(self) -> VarRef {
        VarRef::from_u32(self.0 >> 1)
    }

    /// `1` for a positive view and `-1` for a negative one.
    #[inline]
    pub fn sign(self) -> IntCst {
        if self.is_plus() {
            1
        } else {
            -1
        }
    }

    #[inline]
    pub fn leq(self, ub: IntCst) -> Lit {
        Lit::from_parts(self, UpperBound::ub(ub))
    }

    #[inline]
    pub fn geq(self, lb: IntCst) -> Lit {
        self.neg().leq(-lb)
    }
}

impl std::ops::Neg for SignedVar {
    type Output = Self;

    fn neg(self) -> Self::Output {
        self.neg()
    }
}

impl std::fmt::Debug for SignedVar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_minus() {
            write!(f, "-")?;
        }
        write!(f, "{:?}", self.variable())
    }
}

impl From<SignedVar> for usize {
    fn from(vb: SignedVar) -> Self {
        vb.0 as usize
    }
}

impl From<usize> for SignedVar {
    fn from(u: usize) -> Self {
        SignedVar::from_raw(u as u32)
    }
}

impl From<VarRef> for SignedVar {
    fn from(value: VarRef) -> Self {
        SignedVar::plus(value)
    }
}
