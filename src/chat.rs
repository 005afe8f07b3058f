//! CRO assistant chat with per-session history.

use tracing::{debug, info};

use crate::llm::{LanguageModel, ModelError};
use crate::session::{ChatRole, ChatTurn, SessionStore};

/// Turns of history sent to the model as context.
pub const CONTEXT_TURNS: usize = 5;

pub const GREETING_RESPONSE: &str = "Hello! I'm your CRO Assistant, here to help optimize your website's conversion rate. \n\nHow can I help you today? I can assist with website analysis, conversion optimization strategies, UX improvements, or answer questions about boosting your conversion rates.";

pub const OFF_TOPIC_RESPONSE: &str = "I'm sorry, I'm specialized in website conversion rate optimization and can only help with questions related to improving websites, user experience, or digital marketing strategies. \n\nCould you ask me something about optimizing your website, improving user experience, or increasing conversion rates?";

const GREETINGS: &[&str] = &["hi", "hello", "hey", "greetings"];

const OFF_TOPIC_KEYWORDS: &[&str] = &[
    "personal",
    "politics",
    "medical advice",
    "legal advice",
    "investments",
    "dating",
    "games",
    "movies",
    "music",
    "sports",
    "weather",
    "news",
];

const CRO_TERMS: &[&str] = &[
    "website",
    "conversion",
    "ux",
    "ui",
    "page",
    "user",
    "customer",
    "traffic",
    "bounce",
    "cro",
    "optimization",
];

const SYSTEM_PROMPT: &str = "You are a Conversion Rate Optimization (CRO) specialist chatbot. Your job is to help users understand and improve their website's conversion rates.

Guidelines:
1. Be friendly, helpful, and professional.
2. Only discuss topics related to websites, UX, UI, conversion optimization, and digital marketing.
3. If the user asks about something unrelated to these topics, politely explain that you can only help with website and CRO-related questions.
4. If the user says hello or greets you, respond warmly and ask how you can help them with their website or conversion challenges.
5. Suggest specific actionable advice when possible.
6. Keep responses concise but informative.
7. When appropriate, suggest they use the site analyzer tool for comprehensive insights.

Common CRO topics you can discuss:
- Call-to-Action optimization
- Form design and conversion
- Page load speed issues
- Mobile responsiveness
- User experience (UX) best practices
- A/B testing strategies
- Landing page optimization
- Checkout optimization
- Social proof implementation
- Website copy and messaging";

/// Whether the message contains a greeting word.
pub fn is_greeting(message: &str) -> bool {
    message
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| GREETINGS.contains(&word))
}

/// Whether the message is about an unrelated subject and mentions nothing CRO-related.
pub fn is_off_topic(message: &str) -> bool {
    let lower = message.to_lowercase();
    OFF_TOPIC_KEYWORDS.iter().any(|k| lower.contains(k))
        && !CRO_TERMS.iter().any(|t| lower.contains(t))
}

pub fn build_chat_prompt(recent: &[ChatTurn]) -> String {
    let conversation = recent
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
            };
            format!("{}: {}", speaker, turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\nRecent conversation:\n{}\n\nRespond to the user's most recent message. Remember to only discuss website and CRO-related topics.\nIf the user is asking about something unrelated to CRO, websites, UX, or digital marketing, politely redirect them.",
        SYSTEM_PROMPT, conversation
    )
}

/// Record `message` in the session's history and produce the assistant's reply.
///
/// The session lock is released while the model is called.
pub async fn respond(
    sessions: &SessionStore,
    model: &dyn LanguageModel,
    session_id: &str,
    message: &str,
) -> Result<String, ModelError> {
    let (is_first_turn, recent) = sessions.update(session_id, |session| {
        session.history.push(ChatTurn::user(message));
        let start = session.history.len().saturating_sub(CONTEXT_TURNS);
        (session.history.len() <= 1, session.history[start..].to_vec())
    });

    let reply = if is_first_turn && is_greeting(message) {
        debug!(session_id, "greeting short-circuit");
        GREETING_RESPONSE.to_string()
    } else if is_off_topic(message) {
        debug!(session_id, "off-topic redirect");
        OFF_TOPIC_RESPONSE.to_string()
    } else {
        info!(session_id, turns = recent.len(), "requesting chat reply");
        model.generate(&build_chat_prompt(&recent)).await?
    };

    sessions.update(session_id, |session| {
        session.history.push(ChatTurn::assistant(reply.clone()));
    });
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingModel {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("Try a bolder call-to-action.".to_string())
        }
    }

    fn store() -> SessionStore {
        SessionStore::new(Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn first_hello_is_answered_without_model() {
        let sessions = store();
        let model = RecordingModel::default();

        let reply = respond(&sessions, &model, "s1", "hello").await.unwrap();

        assert_eq!(reply, GREETING_RESPONSE);
        assert!(model.prompts.lock().unwrap().is_empty());
        let history = sessions.get("s1").unwrap().history;
        assert_eq!(history, vec![ChatTurn::user("hello"), ChatTurn::assistant(GREETING_RESPONSE)]);
    }

    #[tokio::test]
    async fn later_greeting_goes_to_model() {
        let sessions = store();
        let model = RecordingModel::default();

        respond(&sessions, &model, "s1", "hello").await.unwrap();
        let reply = respond(&sessions, &model, "s1", "hey, how do I improve my CTA?").await.unwrap();

        assert_eq!(reply, "Try a bolder call-to-action.");
        assert_eq!(model.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn off_topic_question_is_redirected() {
        let sessions = store();
        let model = RecordingModel::default();

        let reply = respond(&sessions, &model, "s1", "What's the weather tomorrow?").await.unwrap();

        assert_eq!(reply, OFF_TOPIC_RESPONSE);
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn prompt_includes_only_recent_turns() {
        let sessions = store();
        let model = RecordingModel::default();

        for i in 0..4 {
            respond(&sessions, &model, "s1", &format!("question {} about my landing page", i))
                .await
                .unwrap();
        }

        let prompts = model.prompts.lock().unwrap();
        let last = prompts.last().unwrap();
        assert!(last.contains("User: question 3 about my landing page"));
        assert!(last.contains("User: question 1 about my landing page"));
        assert!(!last.contains("question 0 about"));
        assert!(last.starts_with("You are a Conversion Rate Optimization"));
        assert_eq!(sessions.get("s1").unwrap().history.len(), 8);
    }

    #[test]
    fn greeting_matches_whole_words() {
        assert!(is_greeting("Hello!"));
        assert!(is_greeting("hi there"));
        assert!(!is_greeting("which CTA works best?"));
        assert!(!is_greeting("this page"));
    }

    #[test]
    fn cro_terms_override_off_topic_keywords() {
        assert!(is_off_topic("who won the sports final?"));
        assert!(!is_off_topic("how do sports websites increase conversion?"));
        assert!(!is_off_topic("optimize my checkout"));
    }
}
