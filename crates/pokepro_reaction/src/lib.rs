pub mod command;
pub mod cooldown;
pub mod dispatcher;
pub mod llm;
pub mod pool;
pub mod responders;
pub mod scheduler;
pub mod sender;
pub mod targets;

#[cfg(test)]
mod testing;

pub use command::{CommandMessage, CommandRunner, PokeCommand};
pub use cooldown::CooldownGate;
pub use dispatcher::{DispatchOutcome, PokeDispatcher};
pub use llm::LlmService;
pub use pool::ResponsePool;
pub use responders::{Responder, ResponderRegistry, ResponseContext};
pub use scheduler::{PokeJob, PokeScheduler};
pub use sender::PokeSender;
pub use targets::{normalize, normalize_one, RawTarget, TargetSet};
