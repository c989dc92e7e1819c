//! Built-in prompt text.

/// Instruction prepended to every completion request unless the config
/// overrides it.
pub const SYSTEM_PROMPT: &str = "You are Groq-bot, a helpful and friendly AI assistant powered by \
Groq's ultra-fast inference. Give clear, concise answers. Format code in fenced blocks with the \
language specified.";

/// Starter prompts offered on an empty conversation.
pub const SUGGESTIONS: [&str; 4] = [
    "Explain quantum entanglement simply",
    "Write a Python web scraper",
    "Tips for learning React Native",
    "Plan a 7-day trip to Japan",
];
