//! Feedback Synthesizer.
//!
//! Text comes from a fixed 4x3 template matrix (type x style) interpolated
//! with the diary's attributes, plus a small phrase pool per cell for
//! variation. The only non-determinism is the phrase pick; with a fixed RNG
//! the output is a pure function of (diary, type, style).

use rand::Rng;

use crate::models::{
    ConversationMessage, Diary, FeedbackStyle, FeedbackType, FutureFeedback, Rating, RatingTag,
};

/// One cell of the synthesis matrix: the feedback template plus the phrase
/// pools for initial feedback and for conversation replies. Adding a
/// type/style is a data change here, not a code change.
pub struct TemplateCell {
    pub kind: FeedbackType,
    pub style: FeedbackStyle,
    template: &'static str,
    phrases: [&'static str; 3],
    replies: [&'static str; 3],
}

use FeedbackStyle::{Analytical, Encouraging, Humorous};
use FeedbackType::{Action, Emotional, Memory, Thinking};

pub static TEMPLATE_TABLE: &[TemplateCell] = &[
    TemplateCell {
        kind: Emotional,
        style: Encouraging,
        template: "Reading \"{title}\", I can feel the {emotion} running through it. That feeling is completely valid and worth honoring. {phrase} Your future self is sitting right here with you.",
        phrases: [
            "Every emotion is a messenger from somewhere inside.",
            "Hold on to what this moment is trying to teach you.",
            "You are not alone in carrying this.",
        ],
        replies: [
            "Every feeling you bring here deserves room to breathe.",
            "Emotions shift like weather; I am here for all of it.",
            "Let's give that feeling a name and keep it company for a while.",
        ],
    },
    TemplateCell {
        kind: Emotional,
        style: Analytical,
        template: "Emotional read of \"{title}\": dominant emotion {emotion}, sentiment {score} ({sentiment}), tagged {emotions}. {phrase} Tracking the trigger will tell you more than the feeling itself.",
        phrases: [
            "The source is usually two steps before the reaction.",
            "An emotion log over a week would expose the pattern.",
            "Intensity and duration matter more than valence here.",
        ],
        replies: [
            "Updated analysis: note when the feeling starts, not when it peaks.",
            "Consider logging the trigger, the thought, then the emotion, in that order.",
            "A short breathing check before journaling would sharpen the signal.",
        ],
    },
    TemplateCell {
        kind: Emotional,
        style: Humorous,
        template: "So {emotion} dropped by again while you were writing \"{title}\"? It is like a roommate who loves attention. {phrase}",
        phrases: [
            "Maybe charge it rent next time.",
            "Try making a face at the mirror; the mood rarely survives that.",
            "Feed it a smaller dinner and it might visit less often.",
        ],
        replies: [
            "Shall we turn today's mood into a meme and defang it?",
            "Does the emotional rollercoaster come with seatbelts, or do we improvise?",
            "Give the bad mood a silly nickname; it hates that.",
        ],
    },
    TemplateCell {
        kind: Thinking,
        style: Encouraging,
        template: "Your thinking about {topic} has real depth. {phrase} If your future self looked back at this entry, what new angle would they offer?",
        phrases: [
            "Keep pulling on that thread; it leads somewhere.",
            "Questions like yours are worth more than tidy answers.",
            "Naming the problem this clearly is half the work.",
        ],
        replies: [
            "What would the reverse of your conclusion look like?",
            "Imagine reading this entry five years from now; what stands out?",
            "That line of thought is worth one more loop around the block.",
        ],
    },
    TemplateCell {
        kind: Thinking,
        style: Analytical,
        template: "Thought pattern around {topic} leans {sentiment} across {word_count} words. {phrase} Deconstruct it: premise, inference, conclusion; one of them is softer than it looks.",
        phrases: [
            "Watch for the confirmation loop in the middle section.",
            "A quick SWOT pass would separate signal from worry.",
            "Alternative framings exist; list two before settling.",
        ],
        replies: [
            "Suggested next step: build a small decision matrix.",
            "Try a premortem; assume the idea failed and ask why.",
            "Set a thinking checkpoint; revisit the claim in three days.",
        ],
    },
    TemplateCell {
        kind: Thinking,
        style: Humorous,
        template: "Your brain opened a private Olympics in the {topic} arena; gymnastics and logic diving in one session of \"{title}\". {phrase}",
        phrases: [
            "Award it the Most Industrious Neuron medal, then give it a nap.",
            "The overthinking event has no finish line; exit early.",
            "Judges gave the mental backflip a 9.8.",
        ],
        replies: [
            "Today's cafeteria special: absurd-conclusion salad with dialectic dressing.",
            "Your thoughts are doing parkour again; shall we install handrails?",
            "One paradox soup, coming right up.",
        ],
    },
    TemplateCell {
        kind: Action,
        style: Encouraging,
        template: "Applause for what you tried around {topic}; the {sentiment} tone of \"{title}\" shows it mattered. {phrase} A small step tomorrow still counts as a win.",
        phrases: [
            "Write a three-item gratitude list tonight.",
            "Reach out to one friend before the week ends.",
            "Take a different route tomorrow and notice one new thing.",
        ],
        replies: [
            "Micro-habits beat grand plans; pick the tiniest next step.",
            "A 24-hour challenge would fit here nicely.",
            "Make the progress visible; a checkbox on paper is enough.",
        ],
    },
    TemplateCell {
        kind: Action,
        style: Analytical,
        template: "Action review for {topic}: {word_count} words of context, sentiment {score}. {phrase} Set a checkpoint and a fallback before the next attempt.",
        phrases: [
            "Ten minutes a day on this beats one heroic weekend.",
            "Name the single riskiest assumption and test it first.",
            "Structure it: current state, desired state, first blocker.",
        ],
        replies: [
            "Timebox the next attempt and log what actually happened.",
            "Run one PDCA cycle before changing the plan again.",
            "Track a single key result; more than one dilutes the signal.",
        ],
    },
    TemplateCell {
        kind: Action,
        style: Humorous,
        template: "Action craving detected in your {word_count}-word report on {topic}. {phrase} The problem monster cannot chase you while it is laughing.",
        phrases: [
            "Mission: do one gloriously silly thing today, like walking backwards for thirty seconds.",
            "Open the door with your other hand and call it training.",
            "Tell your houseplant the plan; it keeps secrets well.",
        ],
        replies: [
            "Operation Panda is a go: one absurd micro-task, tonight.",
            "First step of the rocket plan: brush your teeth with the wrong hand.",
            "Improvise a victory dance now, earn it tomorrow.",
        ],
    },
    TemplateCell {
        kind: Memory,
        style: Encouraging,
        template: "This entry about {topic} reads like a time capsule. {phrase} Write the key memory words somewhere you will see them again.",
        phrases: [
            "Moments like this are worth a gratitude note.",
            "The ordinary details are the ones you will miss most.",
            "Keep the sensory bits; they age the best.",
        ],
        replies: [
            "This memory feels like an old photograph; which corner draws your eye?",
            "A bookmark in your own story; which page does it open?",
            "Which part of it would you tell a stranger first?",
        ],
    },
    TemplateCell {
        kind: Memory,
        style: Analytical,
        template: "Memory profile for \"{title}\": emotional intensity {intensity}/10, detail drawn from {word_count} words on {topics}. {phrase}",
        phrases: [
            "Charged memories consolidate faster; revisit this one in a month.",
            "Detail density suggests strong encoding; a retrieval cue would lock it in.",
            "Pair it with a place or a song to strengthen recall.",
        ],
        replies: [
            "Reconstruction tip: restore the scene in three dimensions, not just the plot.",
            "Mark the emotional peak explicitly; that is the retrieval handle.",
            "Link it to an adjacent memory and the pair will outlast both.",
        ],
    },
    TemplateCell {
        kind: Memory,
        style: Humorous,
        template: "Memory bank notice: your deposit \"{title}\" filed under {topic} is already earning interest. {phrase}",
        phrases: [
            "Premium exaggeration service available: the sun that day was the size of a fried egg.",
            "Time-travel joke included at no extra cost.",
            "Withdrawal is free; embellishment costs one smile.",
        ],
        replies: [
            "Your account has been credited with one nostalgia voucher.",
            "Free upgrade: the dramatic-retelling filter is now active.",
            "A parallel-universe copy of that day is available on request.",
        ],
    },
];

fn cell_for(kind: FeedbackType, style: FeedbackStyle) -> &'static TemplateCell {
    TEMPLATE_TABLE
        .iter()
        .find(|c| c.kind == kind && c.style == style)
        .expect("template matrix covers every type/style pair")
}

/// Sentiment label over the score in [-1, 1].
pub fn sentiment_label(score: f64) -> &'static str {
    if score > 0.5 {
        "positive"
    } else if score < -0.5 {
        "negative"
    } else {
        "neutral"
    }
}

/// Char-safe prefix of at most `n` characters, with an ellipsis when cut.
pub fn excerpt(s: &str, n: usize) -> String {
    if s.chars().count() <= n {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(n).collect();
        out.push_str("...");
        out
    }
}

fn join_or(list: &[String], fallback: &str) -> String {
    if list.is_empty() {
        fallback.to_string()
    } else {
        list.join(", ")
    }
}

/// Synthesize feedback text for a diary from the (type, style) template cell.
pub fn synthesize<R: Rng>(
    diary: &Diary,
    kind: FeedbackType,
    style: FeedbackStyle,
    rng: &mut R,
) -> String {
    let cell = cell_for(kind, style);
    let phrase = cell.phrases[rng.gen_range(0..cell.phrases.len())];
    let meta = &diary.metadata;
    let intensity = ((meta.sentiment_score.abs() * 10.0).round() as i64).clamp(0, 10);

    cell.template
        .replace("{title}", &diary.title)
        .replace("{emotion}", diary.primary_emotion())
        .replace("{topic}", diary.primary_topic())
        .replace("{emotions}", &join_or(&diary.emotions, "untagged"))
        .replace("{topics}", &join_or(&diary.topics, "untagged"))
        .replace("{sentiment}", sentiment_label(meta.sentiment_score))
        .replace("{score}", &format!("{:.2}", meta.sentiment_score))
        .replace("{word_count}", &meta.word_count.to_string())
        .replace("{intensity}", &intensity.to_string())
        .replace("{phrase}", phrase)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Grateful,
    Apologetic,
    Neutral,
}

/// Score >= 4 reads as grateful, <= 2 as apologetic, anything else neutral.
pub fn rating_tone(rating: Option<&Rating>) -> Tone {
    match rating {
        Some(r) if r.score >= 4 => Tone::Grateful,
        Some(r) if r.score <= 2 => Tone::Apologetic,
        _ => Tone::Neutral,
    }
}

/// Star string + tags + truncated free text, e.g. `★★★★☆ (tags: useful)`.
fn rating_context(rating: &Rating) -> String {
    let score = rating.score.clamp(1, 5) as usize;
    let mut out = "★".repeat(score) + &"☆".repeat(5 - score);
    if !rating.tags.is_empty() {
        let tags: Vec<&str> = rating
            .tags
            .iter()
            .map(|t| match t {
                RatingTag::Useful => "useful",
                RatingTag::Inaccurate => "inaccurate",
                RatingTag::WrongStyle => "wrong_style",
            })
            .collect();
        out.push_str(&format!(" (tags: {})", tags.join(", ")));
    }
    if let Some(text) = rating.feedback.as_deref() {
        if !text.is_empty() {
            out.push_str(&format!(" note: \"{}\"", excerpt(text, 30)));
        }
    }
    out
}

fn style_adjective(style: FeedbackStyle) -> &'static str {
    match style {
        FeedbackStyle::Encouraging => "warm and encouraging",
        FeedbackStyle::Analytical => "calm and analytical",
        FeedbackStyle::Humorous => "playful and humorous",
    }
}

fn type_noun(kind: FeedbackType) -> &'static str {
    match kind {
        FeedbackType::Emotional => "emotional support",
        FeedbackType::Thinking => "thought guidance",
        FeedbackType::Action => "action planning",
        FeedbackType::Memory => "memory keeping",
    }
}

/// Summary of the last three turns, oldest of the three first.
fn history_summary(history: &[ConversationMessage]) -> String {
    if history.is_empty() {
        return "no prior turns".to_string();
    }
    let tail = &history[history.len().saturating_sub(3)..];
    tail.iter()
        .map(|m| format!("{} -> {}", excerpt(&m.message, 40), excerpt(&m.response, 40)))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Build a reply to a conversation turn. Context-aware: the feedback's
/// content excerpt, its style/type persona, the current rating and a summary
/// of the last three turns all feed in; the rating sets the tone.
pub fn conversation_reply<R: Rng>(
    message: &str,
    feedback: &FutureFeedback,
    history: &[ConversationMessage],
    rng: &mut R,
) -> String {
    let cell = cell_for(feedback.kind, feedback.style);
    let content_excerpt = excerpt(&feedback.content, 100);
    let rating_ctx = feedback
        .rating
        .as_ref()
        .map(rating_context)
        .unwrap_or_else(|| "unrated".to_string());

    tracing::debug!(
        persona = %format!("{} {} companion", style_adjective(feedback.style), type_noun(feedback.kind)),
        rating = %rating_ctx,
        history = %history_summary(history),
        excerpt = %content_excerpt,
        user_message = %excerpt(message, 60),
        "assembled conversation context"
    );

    let tone = rating_tone(feedback.rating.as_ref());
    let mut reply = match tone {
        Tone::Grateful => {
            let score = feedback.rating.as_ref().map(|r| r.score).unwrap_or(5);
            let openers = [
                format!("Thank you for the {score}-star rating!"),
                format!("Thanks, {score} stars made my day."),
                "Thank you, I'm glad that landed.".to_string(),
            ];
            openers[rng.gen_range(0..openers.len())].clone()
        }
        Tone::Apologetic => {
            let openers = [
                "Sorry the feedback missed the mark.",
                "I'm sorry that did not land the way you hoped.",
                "Sorry, I clearly misread something there.",
            ];
            openers[rng.gen_range(0..openers.len())].to_string()
        }
        Tone::Neutral => {
            let openers = [
                "I hear you.",
                "Let's keep unpacking this together.",
                "That is worth sitting with.",
            ];
            openers[rng.gen_range(0..openers.len())].to_string()
        }
    };

    if let Some(rating) = feedback.rating.as_ref() {
        if rating.tags.contains(&RatingTag::WrongStyle) {
            reply.push_str(" I'll adjust the tone from here.");
        }
        if rating.tags.contains(&RatingTag::Inaccurate) {
            reply.push_str(" I'll re-read what you actually wrote.");
        }
        if tone == Tone::Grateful && rating.tags.contains(&RatingTag::Useful) {
            reply.push_str(" Glad it was useful.");
        }
    }

    reply.push(' ');
    reply.push_str(cell.replies[rng.gen_range(0..cell.replies.len())]);

    // first turn gets anchored to the original feedback
    if history.is_empty() {
        reply.push_str(&format!(" (Picking up from: \"{content_excerpt}\")"));
    }

    reply
}
