pub mod agent;
pub mod claude_cli;
pub mod error;
pub mod invoker;
pub mod parser;
pub mod prompts;
pub mod synthesizer;

pub mod test_support;

pub use agent::{AnalysisAgent, CliAgent};
pub use error::AgentError;
pub use invoker::{invoke, MAX_REASONING_CHARS};
pub use synthesizer::{CliSynthesizer, Synthesizer};
