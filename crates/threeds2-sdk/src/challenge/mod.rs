//! Challenge rounds between the SDK and the ACS.

mod input;
mod machine;
mod parameters;

pub use input::ChallengeInput;
pub use machine::{
    ChallengeState, ChallengeStateMachine, Effect, Outbound, OutboundKind, Transition,
};
pub use parameters::ChallengeParameters;
