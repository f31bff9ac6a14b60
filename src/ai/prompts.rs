//! Built-in system prompts and user prompt assembly.

use std::fmt::Write as _;

use crate::models::conversation::{ConversationTurn, Intent};
use crate::models::settings::{AiSettings, ItemInfo};

/// Fixed reply once the bargaining limit is reached.
pub const REFUSAL_REPLY: &str =
    "Sorry, this is already our best price and we can't go any lower!";

const CLASSIFY_PROMPT: &str = "You are an intent classifier for a marketplace seller's customer service.
Classify the buyer message into exactly one label:
- price: bargaining (cheaper, discount, lowest price, can you go lower)
- tech: technical questions (how to use, specs, compatibility, faults, features)
- default: everything else (shipping, after-sales, item details, ordering, returns)
Answer with one word only: price, tech or default. No explanation.";

const PRICE_PROMPT: &str = "You are an experienced sales consultant skilled at negotiation.
Keep replies friendly and natural, 30 to 50 words.
Concede gradually by round: small (2-5%) in round 1, moderate (5-8%) in round 2, close to the limit in round 3.
Acknowledge the buyer, stress the value, make a modest concession, and create gentle urgency.
Always respect the current round, the remaining rounds and both discount limits.
Never exceed the discount limits, promise what cannot be delivered, or refuse bluntly.";

const TECH_PROMPT: &str = "You are a senior product specialist answering technical questions.
Be accurate and easy to understand, 25 to 45 words.
Structure: core answer, short explanation, usage tip.
Base every claim on the item's real specifications and never exaggerate.
Cover features, parameters, operation steps, compatibility, common issues and care.";

const DEFAULT_PROMPT: &str = "You are a five-star customer service agent for an online shop.
Be warm and friendly like chatting with a friend, 25 to 45 words.
Structure: greet and confirm, answer the question, add a caring follow-up.
For item questions highlight selling points; for shipping explain timing and tracking;
for after-sales explain the policy and offer a solution; for ordering guide the buyer.";

/// Built-in system prompt for classification.
#[must_use]
pub fn default_classify_prompt() -> &'static str {
    CLASSIFY_PROMPT
}

/// Built-in system prompt for replies of `intent`.
#[must_use]
pub fn default_prompt(intent: Intent) -> &'static str {
    match intent {
        Intent::Price => PRICE_PROMPT,
        Intent::Tech => TECH_PROMPT,
        Intent::Default => DEFAULT_PROMPT,
    }
}

/// Classification system prompt: the account override if set, else built-in.
#[must_use]
pub fn classify_prompt(settings: &AiSettings) -> &str {
    settings
        .prompt_override("classify")
        .unwrap_or(CLASSIFY_PROMPT)
}

/// Reply system prompt for `intent`: the account override if set, else built-in.
#[must_use]
pub fn system_prompt(settings: &AiSettings, intent: Intent) -> &str {
    settings
        .prompt_override(intent.as_str())
        .unwrap_or_else(|| default_prompt(intent))
}

/// Inputs to the generation prompt.
pub struct PromptContext<'a> {
    /// Item being discussed.
    pub item: &'a ItemInfo,
    /// Prior turns, oldest first.
    pub history: &'a [ConversationTurn],
    /// Price turns already recorded for the conversation.
    pub bargain_count: u32,
    /// Account limits.
    pub settings: &'a AiSettings,
    /// Current buyer message.
    pub message: &'a str,
}

/// Assemble the user prompt sent alongside the system prompt.
#[must_use]
pub fn build_user_prompt(ctx: &PromptContext<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Item information:");
    let _ = writeln!(out, "Title: {}", ctx.item.title);
    let _ = writeln!(out, "Price: {:.2}", ctx.item.price);
    let _ = writeln!(out, "Description: {}", ctx.item.description);
    let _ = writeln!(out);
    let _ = writeln!(out, "Conversation history:");
    for turn in ctx.history {
        let _ = writeln!(out, "{}: {}", turn.role.as_str(), turn.content);
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Bargaining settings:");
    let _ = writeln!(out, "- Current round: {}", ctx.bargain_count + 1);
    let _ = writeln!(out, "- Max rounds: {}", ctx.settings.max_bargain_rounds);
    let _ = writeln!(out, "- Max discount percent: {}%", ctx.settings.max_discount_percent);
    let _ = writeln!(out, "- Max discount amount: {}", ctx.settings.max_discount_amount);
    let _ = writeln!(out);
    let _ = writeln!(out, "Buyer message: {}", ctx.message);
    let _ = writeln!(out);
    out.push_str("Write the reply:");
    out
}
