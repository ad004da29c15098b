//! Keyword responder: canned answers for the masterclass chatbot.
//!
//! Rules are checked in order and the first match wins. There is no language
//! understanding: a message about "free time" is a pricing question.

use rand::Rng;
use rand::seq::SliceRandom;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

/// What a visitor message is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Registration,
    Pricing,
    Duration,
    Schedule,
    Curriculum,
    Career,
    Experience,
    Fallback,
}

/// Maps a keyword pattern to an intent.
#[derive(Debug, Clone)]
pub struct IntentRule {
    pub intent: Intent,
    pub regex: Regex,
}

/// Rule-based responder with a pool of replies per intent.
pub struct Responder {
    rules: Vec<IntentRule>,
}

impl Responder {
    /// Create a responder with the default keyword rules.
    pub fn default_rules() -> Self {
        let rules = vec![
            intent_rule(Intent::Greeting, r"(?i)\b(hello|hi|hey|greetings)\b"),
            intent_rule(
                Intent::Registration,
                r"(?i)\b(register|registration|sign[\s-]?up|join|enrol)",
            ),
            intent_rule(Intent::Pricing, r"(?i)\b(cost|price|pricing|fee|free|money)"),
            intent_rule(Intent::Duration, r"(?i)\b(duration|how long|length)\b"),
            intent_rule(Intent::Schedule, r"(?i)\b(when|schedule|time|date)"),
            intent_rule(
                Intent::Curriculum,
                r"(?i)\b(learn|teach|curriculum|syllabus|course|topics?)\b",
            ),
            intent_rule(Intent::Career, r"(?i)\b(job|career|salary|placement|work)"),
            intent_rule(Intent::Experience, r"(?i)\b(experience|level|beginner)"),
        ];
        Self { rules }
    }

    /// Classify a message. Returns `Intent::Fallback` when nothing matches.
    pub fn classify(&self, message: &str) -> Intent {
        let message = message.trim();
        for rule in &self.rules {
            if rule.regex.is_match(message) {
                debug!(intent = ?rule.intent, "Message matched intent rule");
                return rule.intent;
            }
        }
        Intent::Fallback
    }

    /// Pick a reply for a message using the thread-local RNG.
    pub fn respond(&self, message: &str) -> String {
        self.respond_with(message, &mut rand::thread_rng())
    }

    /// Pick a reply for a message using the given RNG.
    pub fn respond_with<R: Rng + ?Sized>(&self, message: &str, rng: &mut R) -> String {
        let pool = replies(self.classify(message));
        pool.choose(rng).copied().unwrap_or(FALLBACK_REPLIES[0]).to_string()
    }
}

impl Default for Responder {
    fn default() -> Self {
        Self::default_rules()
    }
}

fn intent_rule(intent: Intent, pattern: &str) -> IntentRule {
    IntentRule {
        intent,
        regex: Regex::new(pattern).expect("built-in intent pattern must compile"),
    }
}

/// Reply pool for an intent.
pub fn replies(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::Greeting => GREETING_REPLIES,
        Intent::Registration => REGISTRATION_REPLIES,
        Intent::Pricing => PRICING_REPLIES,
        Intent::Duration => DURATION_REPLIES,
        Intent::Schedule => SCHEDULE_REPLIES,
        Intent::Curriculum => CURRICULUM_REPLIES,
        Intent::Career => CAREER_REPLIES,
        Intent::Experience => EXPERIENCE_REPLIES,
        Intent::Fallback => FALLBACK_REPLIES,
    }
}

/// Opening line sent when a visitor starts a chat.
pub const WELCOME_MESSAGE: &str = "Hello! I'm Scaler's AI assistant. I'm here to help you learn about our Data Engineering masterclass. What would you like to know?";

const GREETING_REPLIES: &[&str] = &[
    WELCOME_MESSAGE,
    "Hi there! Welcome to Scaler. I can help you understand our Data Engineering program and get you registered for our free masterclass.",
    "Greetings! I'm here to guide you through our Data Engineering masterclass. How can I assist you today?",
];

const REGISTRATION_REPLIES: &[&str] = &[
    "Great! I'd love to help you register for our free Data Engineering masterclass. Can you tell me a bit about your background?",
    "Perfect! Let's get you signed up. What's your current experience level in tech?",
    "Excellent choice! To better assist you, could you share your current technical background and learning goals?",
];

const PRICING_REPLIES: &[&str] = &[
    "The masterclass is completely FREE! It's our way of introducing you to the world of Data Engineering.",
    "No cost at all! This is a free session to help you understand if Data Engineering is the right path for you.",
    "The best part? It's absolutely free! We believe in making quality education accessible to everyone.",
];

const DURATION_REPLIES: &[&str] = &[
    "The masterclass itself is a single live session. The complete Data Engineering program runs for 6 months with flexible learning schedules. What's your preferred timeline?",
];

const SCHEDULE_REPLIES: &[&str] = &[
    "Our next masterclass is scheduled for this Saturday at 2 PM IST. Would you like me to send you a calendar invite?",
    "We have sessions every week! Let me check the upcoming schedule and get you registered for the next available slot.",
    "We offer multiple sessions throughout the week. What time works best for you?",
];

const CURRICULUM_REPLIES: &[&str] = &[
    "Our Data Engineering masterclass covers: Data Modeling, ETL Processes, Big Data Technologies, and Real-world Projects. What interests you most?",
    "The curriculum includes hands-on projects with tools like Apache Spark, Kafka, and modern data warehouses. Sound exciting?",
    "We focus on practical skills: SQL, Python, Data Pipeline Design, and Cloud Platforms. Which area would you like to explore?",
];

const CAREER_REPLIES: &[&str] = &[
    "Data Engineering is one of the fastest-growing tech careers with excellent salary prospects. Would you like to learn more about career opportunities?",
    "Our graduates have landed roles at top companies like Google, Amazon, and Microsoft. Ready to start your journey?",
    "Our career services include resume building, interview preparation, and direct connections with hiring partners. What's your target role?",
];

const EXPERIENCE_REPLIES: &[&str] = &[
    "We welcome all experience levels! The masterclass starts with fundamentals and progresses to advanced concepts. What's your current background in technology?",
];

const FALLBACK_REPLIES: &[&str] = &[
    "That's a great question! I'd be happy to help you learn more about our Data Engineering masterclass. What specific aspect would you like to know about?",
    "Interesting! Let me help you understand how our Data Engineering program can benefit you. Could you tell me more about what you're looking for?",
    "I'd love to help you with that! Our masterclass covers various aspects of Data Engineering. What would you like to explore first?",
];

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn greeting_wins_over_later_rules() {
        let responder = Responder::default_rules();
        assert_eq!(
            responder.classify("Hello, I want to learn about Data Engineering"),
            Intent::Greeting
        );
    }

    #[test]
    fn greeting_needs_whole_word() {
        let responder = Responder::default_rules();
        // "this" and "which" contain "hi"
        assert_eq!(responder.classify("which is this?"), Intent::Fallback);
    }

    #[test]
    fn registration_phrases() {
        let responder = Responder::default_rules();
        assert_eq!(responder.classify("how do I sign up"), Intent::Registration);
        assert_eq!(responder.classify("I'd like to enroll"), Intent::Registration);
        assert_eq!(responder.classify("can I join?"), Intent::Registration);
    }

    #[test]
    fn pricing_and_schedule() {
        let responder = Responder::default_rules();
        assert_eq!(responder.classify("Is it free?"), Intent::Pricing);
        assert_eq!(responder.classify("What's the fee"), Intent::Pricing);
        assert_eq!(responder.classify("When is the next session?"), Intent::Schedule);
    }

    #[test]
    fn duration_checked_before_schedule() {
        let responder = Responder::default_rules();
        assert_eq!(responder.classify("how long does it take"), Intent::Duration);
    }

    #[test]
    fn curriculum_career_experience() {
        let responder = Responder::default_rules();
        assert_eq!(responder.classify("What topics are covered?"), Intent::Curriculum);
        assert_eq!(responder.classify("What salary can I expect"), Intent::Career);
        assert_eq!(responder.classify("I'm a beginner"), Intent::Experience);
    }

    #[test]
    fn unknown_falls_back() {
        let responder = Responder::default_rules();
        assert_eq!(responder.classify("tell me about Spark"), Intent::Fallback);
        assert_eq!(responder.classify(""), Intent::Fallback);
    }

    #[test]
    fn reply_comes_from_intent_pool() {
        let responder = Responder::default_rules();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let reply = responder.respond_with("what does it cost", &mut rng);
            assert!(replies(Intent::Pricing).contains(&reply.as_str()));
        }
    }

    #[test]
    fn every_pool_is_non_empty() {
        for intent in [
            Intent::Greeting,
            Intent::Registration,
            Intent::Pricing,
            Intent::Duration,
            Intent::Schedule,
            Intent::Curriculum,
            Intent::Career,
            Intent::Experience,
            Intent::Fallback,
        ] {
            assert!(!replies(intent).is_empty(), "{intent:?} has no replies");
        }
    }
}
