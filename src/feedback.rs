use serde::Serialize;

use crate::models::{Answer, ContentItem};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub item_id: String,
    pub correct: bool,
    pub expected: Answer,
    pub message: String,
}

fn matches(expected: &Answer, response: &Answer) -> bool {
    match (expected, response) {
        (Answer::Single(e), Answer::Single(r)) => e == r,
        (Answer::Ordered(e), Answer::Ordered(r)) => e == r,
        // a sentence typed out in full
        (Answer::Ordered(e), Answer::Single(r)) => e.join(" ") == *r,
        (Answer::Single(_), Answer::Ordered(_)) => false,
    }
}

pub fn grade(item: &ContentItem, response: &Answer) -> Feedback {
    let correct = matches(&item.answer, response);

    let mut msg = if correct {
        "Correct!".to_string()
    } else {
        format!(
            "The correct answer is '{}'. You answered '{}'.",
            item.answer, response
        )
    };
    if !item.explanation.is_empty() {
        msg.push('\n');
        msg.push_str(&item.explanation);
    }

    Feedback {
        item_id: item.id.clone(),
        correct,
        expected: item.answer.clone(),
        message: msg,
    }
}
