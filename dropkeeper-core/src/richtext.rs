//! Color tags for broadcast text.
//!
//! `{g}Test{/}` becomes `<RichColor Color="0,1,0,1">Test</>`, the rich-text
//! markup the game's chat renders.

const COLOR_TAGS: [(&str, &str); 8] = [
    ("{g}", r#"<RichColor Color="0,1,0,1">"#),
    ("{r}", r#"<RichColor Color="1,0,0,1">"#),
    ("{b}", r#"<RichColor Color="0,0,1,1">"#),
    ("{y}", r#"<RichColor Color="1,1,0,1">"#),
    ("{c}", r#"<RichColor Color="0,1,1,1">"#),
    ("{p}", r#"<RichColor Color="1,0,1,1">"#),
    ("{o}", r#"<RichColor Color="1,0.65,0,1">"#),
    ("{/}", "</>"),
];

/// Substitute every recognized tag. Unknown `{x}` sequences are left alone.
pub fn format_rich_text(input: &str) -> String {
    COLOR_TAGS
        .iter()
        .fold(input.to_string(), |text, (tag, markup)| text.replace(tag, markup))
}

/// Remote console command that broadcasts `message` to everyone online.
pub fn broadcast_command(message: &str) -> String {
    format!("ServerChat {}", format_rich_text(message))
}
