//! Fundamental types of the solver: variables, literals and domains.
//!
//! - [`VarRef`]: a dense integer variable identifier;
//! - [`SignedVar`]: a positive or negative view of a variable, such that
//!   `ub(v) == -lb(-v)`;
//! - [`Lit`]: a boolean statement `[svar <= ub]` about a variable bound;
//! - [`Domain`]: a union of disjoint closed integer intervals (holes are
//!   first class);
//! - [`state`](crate::core::state): the backtrackable current bounds of all
//!   variables, with support for explanations.
//!
//! ```
//! use vela::core::*;
//! use vela::core::state::*;
//! use vela::backtrack::Backtrack;
//! let mut state = Domains::new();
//! let x: VarRef = state.new_var(0, 10);
//! let x_ge_5: Lit = x.geq(5);
//! assert!(!state.entails(x_ge_5));
//!
//! state.save_state();
//! state.set_lb(x, 6, Cause::Decision).unwrap();
//! assert!(state.entails(x_ge_5));
//!
//! state.restore_last();
//! assert_eq!(state.bounds(x), (0, 10));
//! ```

pub use bound_value::*;
pub use cst::*;
pub use domain::*;
pub use lit::*;
pub use signed_var::*;
pub use variable::*;
pub use views::*;

mod bound_value;
mod cst;
mod domain;
mod lit;
pub mod literals;
mod signed_var;
pub mod state;
mod variable;
mod views;
