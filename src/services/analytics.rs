// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin dashboard aggregates.

use crate::models::{Feedback, Generation, GenerationStatus, TopupTransaction, Visit};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationCounts {
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub users: u64,
    pub beta_testers: u64,
    pub generations: GenerationCounts,
    /// IDR collected from credited top-ups
    pub revenue: i64,
    pub diamonds_sold: i64,
    pub feedback_count: u64,
    pub average_rating: Option<f64>,
    /// Visits per country code ("??" when unknown)
    pub visits_by_country: BTreeMap<String, u64>,
}

/// Build the summary from loaded records.
pub fn summarize(
    users: u64,
    beta_testers: u64,
    generations: &[Generation],
    topups: &[TopupTransaction],
    feedback: &[Feedback],
    visits: &[Visit],
) -> AnalyticsSummary {
    let mut summary = AnalyticsSummary {
        users,
        beta_testers,
        ..Default::default()
    };

    for generation in generations {
        match generation.status {
            GenerationStatus::Pending => summary.generations.pending += 1,
            GenerationStatus::Completed => summary.generations.completed += 1,
            GenerationStatus::Failed => summary.generations.failed += 1,
        }
    }

    for topup in topups.iter().filter(|t| t.credited) {
        summary.revenue += topup.amount;
        summary.diamonds_sold += topup.diamonds;
    }

    summary.feedback_count = feedback.len() as u64;
    if !feedback.is_empty() {
        let total: u64 = feedback.iter().map(|f| u64::from(f.rating)).sum();
        summary.average_rating = Some(total as f64 / feedback.len() as f64);
    }

    for visit in visits {
        let key = visit.country_code.clone().unwrap_or_else(|| "??".to_string());
        *summary.visits_by_country.entry(key).or_default() += 1;
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeedbackStatus, TopupStatus};

    fn generation(status: GenerationStatus) -> Generation {
        Generation {
            id: "g".into(),
            uid: "u".into(),
            style_id: "s".into(),
            style_name: "S".into(),
            source_image_url: String::new(),
            task_id: String::new(),
            status,
            result_urls: vec![],
            cost: 1,
            refunded: false,
            is_public: false,
            hidden: false,
            error: None,
            created_at: String::new(),
            completed_at: None,
        }
    }

    fn topup(amount: i64, diamonds: i64, credited: bool) -> TopupTransaction {
        TopupTransaction {
            order_id: "o".into(),
            uid: "u".into(),
            email: None,
            package_id: "p".into(),
            diamonds,
            amount,
            status: if credited {
                TopupStatus::Success
            } else {
                TopupStatus::Pending
            },
            snap_token: None,
            redirect_url: None,
            payment_type: None,
            gateway_transaction_id: None,
            gateway_status: None,
            credited,
            completed_by: None,
            created_at: String::new(),
            updated_at: String::new(),
            settled_at: None,
        }
    }

    fn feedback(rating: u8) -> Feedback {
        Feedback {
            id: "f".into(),
            uid: "u".into(),
            email: None,
            rating,
            category: "bug".into(),
            message: "m".into(),
            status: FeedbackStatus::New,
            admin_note: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn visit(code: Option<&str>) -> Visit {
        Visit {
            id: "v".into(),
            path: "/".into(),
            country: "X".into(),
            country_code: code.map(str::to_string),
            city: None,
            referrer: None,
            created_at: String::new(),
        }
    }

    #[test]
    fn test_summarize() {
        let summary = summarize(
            10,
            2,
            &[
                generation(GenerationStatus::Completed),
                generation(GenerationStatus::Completed),
                generation(GenerationStatus::Failed),
            ],
            &[topup(10_000, 10, true), topup(45_000, 50, false)],
            &[feedback(5), feedback(4)],
            &[visit(Some("ID")), visit(Some("ID")), visit(None)],
        );

        assert_eq!(summary.users, 10);
        assert_eq!(summary.generations.completed, 2);
        assert_eq!(summary.generations.failed, 1);
        assert_eq!(summary.revenue, 10_000);
        assert_eq!(summary.diamonds_sold, 10);
        assert_eq!(summary.average_rating, Some(4.5));
        assert_eq!(summary.visits_by_country.get("ID"), Some(&2));
        assert_eq!(summary.visits_by_country.get("??"), Some(&1));
    }

    #[test]
    fn test_empty_summary_has_no_rating() {
        let summary = summarize(0, 0, &[], &[], &[], &[]);
        assert_eq!(summary.average_rating, None);
        assert!(summary.visits_by_country.is_empty());
    }
}
