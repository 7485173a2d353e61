/// Type of the integer constants manipulated by the solver.
pub type IntCst = i64;

/// Type used for intermediate results of arithmetic on [`IntCst`] that may overflow.
pub type LongCst = i128;

/// Widens an [`IntCst`] to the overflow-tolerant type.
pub(crate) const fn cst_int_to_long(cst: IntCst) -> LongCst {
    cst as LongCst
}

/// Narrows a [`LongCst`] back. The caller must have clamped the value into the
/// representable range first.
pub(crate) const fn cst_long_to_int(cst: LongCst) -> IntCst {
    cst as IntCst
}

/// Overflow tolerant maximum value, used as the default upper bound of domains.
pub const INT_CST_MAX: IntCst = IntCst::MAX / 4 - 1;

/// Overflow tolerant minimum value, used as the default lower bound of domains.
pub const INT_CST_MIN: IntCst = -INT_CST_MAX;
