// Fixed generation parameters and defaults shared by the CLI and the provider client.

use crate::gemini::{HarmBlockThreshold, HarmCategory, SafetySetting};

pub const DEFAULT_MODEL: &str = "gemini-1.5-pro-latest";
pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

// Moderate sampling: some variety between plans, stable JSON shape.
pub const TEMPERATURE: f64 = 0.7;
pub const RESPONSE_MIME_TYPE: &str = "application/json";

pub const PLAN_WEEKS: usize = 4;

lazy_static::lazy_static! {
    /// Block medium-and-above content in the four standard harm categories.
    pub static ref SAFETY_SETTINGS: Vec<SafetySetting> = [
        HarmCategory::Harassment,
        HarmCategory::HateSpeech,
        HarmCategory::SexuallyExplicit,
        HarmCategory::DangerousContent,
    ]
    .into_iter()
    .map(|category| SafetySetting {
        category,
        threshold: HarmBlockThreshold::BlockMediumAndAbove,
    })
    .collect();
}
