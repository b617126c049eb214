//! Language model adapters.
//!
//! ## Available Adapters
//!
//! - `OpenAIProvider` - any OpenAI-compatible chat completions endpoint
//! - `MockLanguageModel` - scripted model for tests
//! - `ModelInvoker` - multi-step invocation loop over a `LanguageModel`
//! - `NoTools` - empty tool set

mod invocation;
mod mock_provider;
mod no_tools;
mod openai_provider;
mod smoothing;

pub use invocation::{
    to_model_messages, Invocation, InvocationSettings, ModelInvoker, REASONING_MODEL_ID,
};
pub use mock_provider::{MockLanguageModel, MockStep};
pub use no_tools::NoTools;
pub use openai_provider::{OpenAIConfig, OpenAIProvider};
pub use smoothing::WordChunker;
