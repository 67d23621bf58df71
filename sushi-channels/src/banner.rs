//! Fixed texts the bot posts outside of model replies.
//!
//! History reconstruction recognizes these by their leading sentinels, so the
//! prefixes below must stay stable across releases.

use crate::command::CommandSyntax;
use sushi_providers::KnownModel;

/// Leading text of every error report.
pub const ERROR_HEADER: &str = "Something went wrong.\nHere's the traceback for the brave of heart:\n";

/// Leading text of the help and onboarding banners.
pub const BANNER_SENTINEL: &str = ":sushi: *SushiBot*";

/// Reply to channel mentions.
pub const MENTION_REPLY: &str = "Hi! Currently I only support direct messages. Send me a DM to chat.";

/// Placeholder posted while a streamed reply is being produced.
pub const THINKING_PLACEHOLDER: &str = ":hourglass_flowing_sand: _thinking..._";

/// Appended to in-progress streamed text.
pub const THINKING_SUFFIX: &str = " :hourglass_flowing_sand:";

/// Appended to a streamed segment that continues in the next message.
pub const CONTINUED_MARKER: &str = "\n_(continued below)_";

/// Error report for a failed turn.
pub fn error_report(error: &anyhow::Error) -> String {
    format!("{ERROR_HEADER}\n```\n{error:#}\n```\n")
}

/// Command reference.
pub fn help_text(syntax: &CommandSyntax) -> String {
    let mut text = format!("{BANNER_SENTINEL} commands\n");
    let cmd = |token: &str| syntax.render(token);

    text.push_str(&format!(
        "• `{}` / `{}`: start a fresh conversation\n",
        cmd("reset"),
        cmd("clear")
    ));
    text.push_str(&format!(
        "• `{}` / `{}`: show the current model\n",
        cmd("who"),
        cmd("model")
    ));
    text.push_str(&format!("• `{}`: toggle streaming replies\n", cmd("stream")));
    text.push_str(&format!("• `{}`: turn streaming off\n", cmd("nostream")));
    text.push_str(&format!("• `{}` / `{}`: this message\n", cmd("help"), cmd("?")));
    text.push_str("Models:\n");
    for model in KnownModel::ALL {
        text.push_str(&format!("• `{}`: {}\n", cmd(model.token()), model.display_name()));
    }

    text
}

/// Greeting posted once at the start of a conversation.
pub fn onboarding_text(syntax: &CommandSyntax) -> String {
    format!(
        "{BANNER_SENTINEL} here! Ask me anything, share files or links, and I'll read them too. \
         Send `{}` to see what else I can do.",
        syntax.render("help")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banners_share_the_sentinel() {
        let syntax = CommandSyntax::default();
        assert!(help_text(&syntax).starts_with(BANNER_SENTINEL));
        assert!(onboarding_text(&syntax).starts_with(BANNER_SENTINEL));
        assert!(help_text(&syntax).contains("`\\sonnet`: Claude 3.5 Sonnet"));
    }

    #[test]
    fn error_report_fences_the_chain() {
        let err = anyhow::anyhow!("connection reset").context("Model invocation failed");
        let report = error_report(&err);
        assert!(report.starts_with(ERROR_HEADER));
        assert!(report.contains("```\nModel invocation failed: connection reset\n```"));
    }
}
