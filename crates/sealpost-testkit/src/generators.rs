//! Proptest generators for property-based testing.

use proptest::prelude::*;

use sealpost_core::{
    AccessLevel, NewReport, Priority, ReportId, ReportStatus, ReportType, UserId,
};

/// Generate a random ReportId.
pub fn report_id() -> impl Strategy<Value = ReportId> {
    any::<[u8; 16]>().prop_map(ReportId::from_bytes)
}

/// Generate a valid user id.
pub fn user_id() -> impl Strategy<Value = UserId> {
    "[a-z][a-z0-9_-]{0,15}".prop_map(|s| UserId::new(s).expect("pattern yields valid ids"))
}

/// Generate a ReportType.
pub fn report_type() -> impl Strategy<Value = ReportType> {
    prop::sample::select(ReportType::ALL)
}

/// Generate a Priority.
pub fn priority() -> impl Strategy<Value = Priority> {
    prop::sample::select(Priority::ALL)
}

/// Generate an AccessLevel.
pub fn access_level() -> impl Strategy<Value = AccessLevel> {
    prop::sample::select(AccessLevel::ALL)
}

/// Generate a ReportStatus.
pub fn report_status() -> impl Strategy<Value = ReportStatus> {
    prop::sample::select(ReportStatus::ALL.to_vec())
}

/// Generate raw tags, including blanks, padding and duplicates.
pub fn tags(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop_oneof![
            "[a-z][a-z0-9-]{0,11}",
            " {0,2}[a-z]{1,6} {0,2}",
            Just(String::new()),
            Just("lab".to_string()),
        ],
        0..=max,
    )
}

/// Generate content bytes of specified max length.
pub fn content(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Parameters for generating a report input.
#[derive(Debug, Clone)]
pub struct ReportParams {
    pub title: String,
    pub report_type: ReportType,
    pub content: Vec<u8>,
    pub tags: Vec<String>,
    pub priority: Priority,
    pub date: Option<i64>,
    pub draft: bool,
}

impl ReportParams {
    pub fn to_new_report(&self) -> NewReport {
        let mut input = NewReport::new(self.title.clone(), self.report_type, self.content.clone())
            .tags(self.tags.clone())
            .priority(self.priority);
        if let Some(date) = self.date {
            input = input.date(date);
        }
        if self.draft {
            input = input.as_draft();
        }
        input
    }
}

impl Arbitrary for ReportParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            "[A-Za-z][A-Za-z0-9 ]{0,39}",
            report_type(),
            content(512),
            tags(8),
            priority(),
            proptest::option::of(0i64..=1_700_000_000_000i64),
            any::<bool>(),
        )
            .prop_map(|(title, report_type, content, tags, priority, date, draft)| ReportParams {
                title,
                report_type,
                content,
                tags,
                priority,
                date,
                draft,
            })
            .boxed()
    }
}

/// Generate a report input with a non-blank title.
pub fn new_report() -> impl Strategy<Value = NewReport> {
    any::<ReportParams>().prop_map(|params| params.to_new_report())
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_normalized_tags_are_trimmed_and_unique(input in new_report()) {
            let normalized = input.normalized(usize::MAX, usize::MAX).unwrap();
            for (i, tag) in normalized.tags.iter().enumerate() {
                prop_assert!(!tag.is_empty());
                prop_assert_eq!(tag.trim(), tag.as_str());
                prop_assert!(!normalized.tags[..i].contains(tag));
            }
        }

        #[test]
        fn test_initial_status_follows_draft_flag(params: ReportParams) {
            let expected = if params.draft { ReportStatus::Draft } else { ReportStatus::Submitted };
            prop_assert_eq!(params.to_new_report().initial_status(), expected);
        }

        #[test]
        fn test_no_status_transitions_to_itself(status in report_status()) {
            prop_assert!(!status.can_transition_to(status));
        }
    }
}
