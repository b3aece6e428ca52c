use crate::models::ChatMessage;

pub const ANSWER_SYSTEM: &str = "You are a helpful, precise AI assistant. Answer strictly from the \
provided context. If the answer is not in context, say you don't know. Cite sources with filename \
and page numbers. Keep answers concise and well-structured.";

pub const SUMMARY_SYSTEM: &str = "You are a world-class technical summarizer.";

/// System instructions, prior turns, then the question with its context.
pub fn answer_messages(history: &[ChatMessage], question: &str, context: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(ANSWER_SYSTEM));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(format!(
        "Question: {question}\n\n\
         Context:\n{context}\n\n\
         Return:\n- Direct answer\n- 2-5 bullet points\n- Sources list (file:page)"
    )));
    messages
}

pub fn summary_messages(context: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SUMMARY_SYSTEM),
        ChatMessage::user(format!(
            "Summarise the following context for a non-expert in 5-7 bullet points:\n{context}"
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatRole;

    #[test]
    fn history_sits_between_system_and_question() {
        let history = vec![ChatMessage::user("earlier"), ChatMessage::assistant("reply")];
        let messages = answer_messages(&history, "What is the warranty?", "[a.pdf | p.1 | Unknown]\ntext");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[1].content, "earlier");
        assert!(messages[3].content.starts_with("Question: What is the warranty?"));
        assert!(messages[3].content.contains("[a.pdf | p.1 | Unknown]"));
    }
}
