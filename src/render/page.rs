//! Full page shell.

use super::{Element, Node, escape};

/// The composer: message and nickname fields plus the send button.
fn composer() -> Node {
    Element::new("div")
        .class("composer")
        .child(
            Element::new("input")
                .id("nickname")
                .attr("type", "text")
                .attr("placeholder", "Nickname")
                .attr("autocomplete", "nickname"),
        )
        .child(
            Element::new("input")
                .id("message")
                .attr("type", "text")
                .attr("placeholder", "Message")
                .attr("autocomplete", "off"),
        )
        .child(
            Element::new("button")
                .id("send")
                .attr("type", "button")
                .text("Send"),
        )
        .into()
}

/// Render the whole page around an already rendered `#messages` list.
#[must_use]
pub fn page(title: &str, messages: &Node) -> String {
    let title = escape(title);
    let messages = messages.to_html();
    let composer = composer().to_html();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.5.1/css/all.min.css">
    <link rel="stylesheet" href="/static/chat.css">
    <script defer src="/static/chat.js"></script>
</head>
<body>
    <main class="chat">
        <header class="chat-header"><h1>{title}</h1></header>
        {messages}
        <div id="status" role="status" aria-live="assertive"></div>
        {composer}
    </main>
</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{Affordances, MessageView, message_list};

    #[test]
    fn test_page_contains_interface_elements() {
        let list = message_list(std::iter::empty::<&MessageView>(), Affordances::default());
        let html = page("Chat <dev>", &list);

        for id in ["messages", "message", "nickname", "send", "status"] {
            assert!(
                html.contains(&format!("id=\"{id}\"")),
                "missing #{id} in page"
            );
        }
        assert!(html.contains("<title>Chat &lt;dev&gt;</title>"));
    }
}
