use std::time::Duration;

/// Default instruction handed to the image model; override with
/// `TRYON_PROMPT` to tune wording without a rebuild.
pub const DEFAULT_INSTRUCTION: &str = "Place the provided t-shirt mockup on the person in the \
user photo. Match lighting and body pose, and keep the printed art clearly visible and \
correctly warped. Output only the final photorealistic image.";

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

#[derive(Debug, Clone)]
pub struct Config {
    /// Absent key is not fatal: the frontend shows the activation screen
    /// and every try-on fails with the re-auth flag until it is set.
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub instruction: String,
    /// The endpoint has no latency bound of its own, so requests get a
    /// bounded wait before surfacing an unavailability error.
    pub request_timeout: Duration,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        let timeout_secs = env_parsed("TRYON_TIMEOUT_SECS").unwrap_or(60);
        Self {
            api_key: non_empty_env("GEMINI_API_KEY"),
            api_base: non_empty_env("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.into()),
            model: non_empty_env("TRYON_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            instruction: non_empty_env("TRYON_PROMPT").unwrap_or_else(|| DEFAULT_INSTRUCTION.into()),
            request_timeout: Duration::from_secs(timeout_secs),
            port: env_parsed("PORT").unwrap_or(8080),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
