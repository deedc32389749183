//! Counselor message texts.
//!
//! Pure functions from session facts to user-facing strings; no state.

use duologue_core::Topic;

/// Opening message when both participants are present and a session starts.
pub fn intro(segment_minutes: u64) -> String {
    format!(
        "Welcome, both of you. We'll talk through two topics together: first \
         the situation itself, then the emotions behind it. Each topic has \
         {segment_minutes} minutes. Let's begin with the situation — what \
         happened, from each of your points of view?"
    )
}

/// Announcement when the conversation moves to a topic.
pub fn topic_opening(topic: Topic) -> String {
    match topic {
        Topic::Situation => {
            "Let's talk about the situation. Take turns describing what happened \
             as concretely as you can."
                .to_owned()
        }
        Topic::Emotion => {
            "Time to move on. Now let's talk about your emotions — how did the \
             situation make each of you feel?"
                .to_owned()
        }
    }
}

/// Prompt sent when a segment's time runs out and a vote opens.
pub fn extension_prompt(topic: Topic) -> String {
    format!(
        "Time is up for {}. Would you like a little more time on this topic? \
         Let me know yes or no.",
        topic.label()
    )
}

/// Both participants wanted more time.
pub fn extended_all(topic: Topic, segment_minutes: u64) -> String {
    format!(
        "You both wanted to continue, so let's take {segment_minutes} more \
         minutes on {}.",
        topic.label()
    )
}

/// Only one participant wanted more time; the segment still extends.
pub fn extended_one(topic: Topic, segment_minutes: u64) -> String {
    format!(
        "One of you wanted to keep going, so we'll stay with {} for \
         {segment_minutes} more minutes. Try to hear each other out.",
        topic.label()
    )
}

/// Sent to the first voter while the other's answer is outstanding.
pub fn waiting_for_other() -> &'static str {
    "Got it. Let's wait for your partner's answer."
}

/// Closing message after the final topic ends.
pub fn closing() -> &'static str {
    "That brings our conversation to a close. Thank you both for sharing \
     openly — take a moment to appreciate what you heard from each other \
     today."
}
