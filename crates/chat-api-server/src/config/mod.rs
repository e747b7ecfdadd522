pub mod settings;

pub use settings::{
    ChatConfig, LimitsConfig, LlmConfig, MemoryConfig, PromptsConfig, ServerConfig, Settings,
};
