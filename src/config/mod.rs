//! Static game configuration: layout, prompts and delays.

mod layout;
mod prompts;
mod timings;

pub use layout::{Layout, Position, ResetStep, REFRESH_BUTTON};
pub use prompts::{get_prompts, GamePrompts, PROMPTS_EN, PROMPTS_ZH};
pub use timings::Timings;
