// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reasoning-trace item: either a plain string or a structured
/// conclusion/insight pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReasoningItem {
    Plain(String),
    Structured { conclusion: String, insight: String },
}

impl ReasoningItem {
    pub fn as_text(&self) -> String {
        match self {
            ReasoningItem::Plain(s) => s.clone(),
            ReasoningItem::Structured { conclusion, insight } => {
                format!("{conclusion}: {insight}")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub choice: String,
    pub reason: String,
}

/// A unit of team memory, opaque to the core beyond these fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub updated_at: DateTime<Utc>,
    pub goal: String,
    pub summary: String,
    pub original_query: String,
    #[serde(default)]
    pub reasoning_trace: Option<Vec<ReasoningItem>>,
    #[serde(default)]
    pub decisions: Option<Vec<Decision>>,
    #[serde(default)]
    pub files_touched: Option<Vec<String>>,
}

impl Memory {
    /// First 8 characters of the id, used as the short form exposed in
    /// previews and accepted by the expand tool.
    pub fn short_id(&self) -> &str {
        let end = self.id.char_indices().nth(8).map(|(i, _)| i).unwrap_or(self.id.len());
        &self.id[..end]
    }

    /// Render the age bucket for a preview line.
    pub fn age_bucket(&self, now: DateTime<Utc>) -> String {
        let days = (now - self.updated_at).num_days();
        if days <= 0 {
            "today".to_string()
        } else if days == 1 {
            "1 day ago".to_string()
        } else if days < 7 {
            format!("{days} days ago")
        } else if days < 14 {
            "1 week ago".to_string()
        } else if days < 28 {
            format!("{} weeks ago", days / 7)
        } else if days < 60 {
            "1 month ago".to_string()
        } else {
            format!("{} months ago", days / 30)
        }
    }

    /// Join the full expanded body used when the expand tool resolves this
    /// memory.
    pub fn expanded_body(&self) -> String {
        let mut out = format!("## {}\n\n{}\n\nOriginal query: {}\n", self.goal, self.summary, self.original_query);
        if let Some(trace) = &self.reasoning_trace {
            out.push_str("\nReasoning:\n");
            for item in trace {
                out.push_str(&format!("- {}\n", item.as_text()));
            }
        }
        if let Some(decisions) = &self.decisions {
            out.push_str("\nDecisions:\n");
            for d in decisions {
                out.push_str(&format!("- {}: {}\n", d.choice, d.reason));
            }
        }
        if let Some(files) = &self.files_touched {
            if !files.is_empty() {
                out.push_str(&format!("\nFiles touched: {}\n", files.join(", ")));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_with_age(days: i64) -> Memory {
        Memory {
            id: "abcdef1234567890".into(),
            updated_at: Utc::now() - chrono::Duration::days(days),
            goal: "Design worker pool".into(),
            summary: "Bounded FIFO with N workers".into(),
            original_query: "how to build a worker pool".into(),
            reasoning_trace: None,
            decisions: None,
            files_touched: None,
        }
    }

    #[test]
    fn short_id_is_first_eight_chars() {
        let m = memory_with_age(0);
        assert_eq!(m.short_id(), "abcdef12");
    }

    #[test]
    fn short_id_handles_short_ids_gracefully() {
        let mut m = memory_with_age(0);
        m.id = "abc".into();
        assert_eq!(m.short_id(), "abc");
    }

    #[test]
    fn age_bucket_today() {
        assert_eq!(memory_with_age(0).age_bucket(Utc::now()), "today");
    }

    #[test]
    fn age_bucket_one_day() {
        assert_eq!(memory_with_age(1).age_bucket(Utc::now()), "1 day ago");
    }

    #[test]
    fn age_bucket_several_days() {
        assert_eq!(memory_with_age(3).age_bucket(Utc::now()), "3 days ago");
    }

    #[test]
    fn age_bucket_one_week() {
        assert_eq!(memory_with_age(10).age_bucket(Utc::now()), "1 week ago");
    }

    #[test]
    fn age_bucket_weeks() {
        assert_eq!(memory_with_age(21).age_bucket(Utc::now()), "3 weeks ago");
    }

    #[test]
    fn age_bucket_one_month() {
        assert_eq!(memory_with_age(40).age_bucket(Utc::now()), "1 month ago");
    }

    #[test]
    fn age_bucket_months() {
        assert_eq!(memory_with_age(95).age_bucket(Utc::now()), "3 months ago");
    }

    #[test]
    fn expanded_body_includes_goal_and_summary() {
        let m = memory_with_age(0);
        let body = m.expanded_body();
        assert!(body.contains("Design worker pool"));
        assert!(body.contains("Bounded FIFO with N workers"));
    }

    #[test]
    fn reasoning_item_plain_as_text() {
        let r = ReasoningItem::Plain("a simple note".into());
        assert_eq!(r.as_text(), "a simple note");
    }

    #[test]
    fn reasoning_item_structured_as_text() {
        let r = ReasoningItem::Structured { conclusion: "use sqlite".into(), insight: "simplest durable option".into() };
        assert_eq!(r.as_text(), "use sqlite: simplest durable option");
    }

    #[test]
    fn reasoning_item_untagged_deserializes_both_shapes() {
        let plain: ReasoningItem = serde_json::from_str("\"just text\"").unwrap();
        assert!(matches!(plain, ReasoningItem::Plain(_)));
        let structured: ReasoningItem =
            serde_json::from_str(r#"{"conclusion":"c","insight":"i"}"#).unwrap();
        assert!(matches!(structured, ReasoningItem::Structured { .. }));
    }
}
