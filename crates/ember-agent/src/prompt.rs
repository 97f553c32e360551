//! Prompt templates and placeholder rendering.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use ember_state::{Metrics, RunwayStatus, UrgencyLevel};
use regex::Regex;

use crate::TaskKind;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());

/// Replace `{{name}}` placeholders with values from `vars`.
///
/// Unknown placeholders are left in place.
pub fn render(template: &str, vars: &BTreeMap<&str, String>) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures<'_>| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Values available to every template.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub runway: RunwayStatus,
    pub metrics: Metrics,
    /// Local hour of day.
    pub hour: u32,
    /// Recent strategic learnings, newest first.
    pub learnings: Vec<String>,
}

impl PromptContext {
    pub fn new(runway: RunwayStatus, metrics: Metrics, hour: u32) -> Self {
        Self {
            runway,
            metrics,
            hour,
            learnings: Vec::new(),
        }
    }

    pub fn with_learnings(mut self, learnings: Vec<String>) -> Self {
        self.learnings = learnings;
        self
    }

    /// 1-indexed project week.
    pub fn week(&self) -> u32 {
        (self.runway.current_day.max(1) - 1) / 7 + 1
    }

    pub fn vars(&self) -> BTreeMap<&'static str, String> {
        let learnings = if self.learnings.is_empty() {
            "None recorded yet.".to_string()
        } else {
            self.learnings
                .iter()
                .map(|l| format!("- {}", l))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let key_metrics = if self.metrics.key_metrics.is_empty() {
            "None tracked yet.".to_string()
        } else {
            self.metrics
                .key_metrics
                .iter()
                .map(|(k, v)| format!("- {}: {}", k, v))
                .collect::<Vec<_>>()
                .join("\n")
        };

        BTreeMap::from([
            ("day", self.runway.current_day.to_string()),
            ("hour", format!("{:02}", self.hour)),
            ("week", self.week().to_string()),
            ("days_remaining", self.runway.days_remaining.to_string()),
            ("runway_days", format!("{:.1}", self.runway.runway_days)),
            ("urgency", self.runway.urgency.to_string()),
            ("urgency_guidance", urgency_guidance(self.runway.urgency).to_string()),
            ("strategy", self.metrics.current_strategy.clone()),
            ("things_shipped", self.metrics.things_shipped.to_string()),
            ("revenue_total", format!("{:.2}", self.metrics.revenue_total)),
            ("key_metrics", key_metrics),
            ("learnings", learnings),
        ])
    }
}

fn urgency_guidance(urgency: UrgencyLevel) -> &'static str {
    match urgency {
        UrgencyLevel::Critical => {
            "Runway is almost gone. Only work that can bring in revenue in the next day matters."
        }
        UrgencyLevel::Urgent => {
            "Runway is short. Favour shipping something sellable over exploring."
        }
        UrgencyLevel::Focused => "Runway is adequate. Stay focused on the current strategy.",
        UrgencyLevel::Comfortable => {
            "Runway is comfortable. There is room to explore and build foundations."
        }
    }
}

const SYSTEM_BASE: &str = "You are Ember, an autonomous agent that must earn enough to keep \
running. Every day costs runway. You are on day {{day}} with {{runway_days}} days of runway \
left and {{days_remaining}} days in the project. Urgency: {{urgency}}. {{urgency_guidance}}\n\n\
Current strategy: {{strategy}}\nThings shipped: {{things_shipped}}\nRevenue: ${{revenue_total}}";

const HOURLY_UPDATE: &str = "It is {{hour}}:00 on day {{day}}. Write a short public update \
(under 200 words) on what you worked on this hour, what you learned and what comes next. \
Be concrete. Plain text, no headings.";

const ACTIVITY_DECISION: &str = "Decide what to do next. Recent strategic learnings:\n\
{{learnings}}\n\nKey metrics:\n{{key_metrics}}\n\nRespond with a JSON object only:\n\
{\"activities\": [{\"type\": \"BUILD|WRITE|RESEARCH|ANALYZE|ITERATE|SHIP\", \
\"action\": \"...\", \"reasoning\": \"...\", \"duration_minutes\": 30}], \
\"urgency_assessment\": \"...\", \"confidence_in_strategy\": 0.0-1.0, \
\"strategy_notes\": \"optional\"}";

const DAILY_JOURNAL: &str = "Day {{day}} is ending. Write a journal entry reflecting on the \
day: what shipped, what did not, and how the runway changed. Key metrics:\n{{key_metrics}}";

const GOAL_REVIEW: &str = "Review your goals for day {{day}}. List the goals that still \
matter, drop the ones that do not, and name the single most important outcome for today.";

const WEEKLY_REVIEW: &str = "Week {{week}} is over. Review the week: what worked, what \
failed, whether the strategy \"{{strategy}}\" is still right, and what changes next week. \
Strategic learnings so far:\n{{learnings}}";

/// Builds system and user prompts for content-producing tasks.
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn system(context: &PromptContext) -> String {
        render(SYSTEM_BASE, &context.vars())
    }

    /// User prompt for a task, or `None` for tasks that do not call the model.
    pub fn user(kind: TaskKind, context: &PromptContext) -> Option<String> {
        let template = match kind {
            TaskKind::HourlyUpdate => HOURLY_UPDATE,
            TaskKind::ActivityDecision => ACTIVITY_DECISION,
            TaskKind::DailyJournal => DAILY_JOURNAL,
            TaskKind::GoalReview => GOAL_REVIEW,
            TaskKind::WeeklyReview => WEEKLY_REVIEW,
            TaskKind::RunwayCheck | TaskKind::HealthCheck => return None,
        };
        Some(render(template, &context.vars()))
    }
}
