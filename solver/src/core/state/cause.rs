use crate::core::Lit;
use crate::reasoners::ReasonerId;

/// Cause of a domain update, as seen from outside the domain store: an
/// arbitrary decision, an assumption, a root-level encoding fact, or an
/// inference by a reasoning module.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Cause {
    /// Update caused by a search decision.
    Decision,
    /// Update caused by an assumption. Only allowed right above the root level.
    Assumption,
    /// Update resulting from the encoding of a constraint, at the root level.
    Encoding,
    /// The update is an inference. The [`InferenceCause`] identifies the
    /// module that made it and carries a payload that the module may use to
    /// retrieve the premises when asked for an explanation.
    Inference(InferenceCause),
}

impl Cause {
    pub fn inference(writer: ReasonerId, payload: impl Into<u32>) -> Self {
        Cause::Inference(InferenceCause {
            writer,
            payload: payload.into(),
        })
    }
}

/// Identification of an inference: the reasoner that produced it and 32 bits
/// of metadata interpreted by that reasoner only (e.g. a constraint index).
///
/// Explanations are lazy: the payload is only decoded if conflict analysis
/// reaches the inferred literal.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct InferenceCause {
    pub writer: ReasonerId,
    pub payload: u32,
}

/// Origin of a domain event, either external ([`Cause`]) or produced
/// internally by the propagation of a recorded implication.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Origin {
    Decision,
    Assumption,
    /// Root-level encoding of a constraint.
    Encoding,
    /// The given literal became true and triggered this update through the
    /// implication graph.
    ImplicationPropagation(Lit),
    Inference(InferenceCause),
}

impl Origin {
    pub fn as_inference(self) -> Option<InferenceCause> {
        match self {
            Origin::Inference(cause) => Some(cause),
            _ => None,
        }
    }
}

impl From<Cause> for Origin {
    fn from(c: Cause) -> Self {
        match c {
            Cause::Decision => Origin::Decision,
            Cause::Assumption => Origin::Assumption,
            Cause::Encoding => Origin::Encoding,
            Cause::Inference(i) => Origin::Inference(i),
        }
    }
}
