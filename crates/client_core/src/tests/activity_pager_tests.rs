use std::collections::HashSet;

use super::*;
use crate::test_support::{event, events_desc, FakeJobsApi};

const JOB: JobId = JobId(7);

fn pager_over(api: &Arc<FakeJobsApi>) -> ActivityPager {
    ActivityPager::for_job(api.clone(), JOB)
}

fn ids(view: &ActivityView) -> Vec<i64> {
    view.items.iter().map(|event| event.id.0).collect()
}

#[tokio::test]
async fn initial_load_requests_newest_page() {
    let api = FakeJobsApi::new();
    api.seed_activity(JOB, 35);
    let pager = pager_over(&api);

    let outcome = pager.load(LoadRequest::initial()).await;

    assert_eq!(outcome, LoadOutcome::Loaded { added: 20 });
    let view = pager.snapshot().await;
    assert_eq!(view.items.len(), 20);
    assert_eq!(view.items[0].id, ActivityId(35));
    assert_eq!(view.cursor, Some(16));
    assert!(view.has_more);
    assert!(!view.loading_initial && !view.loading_more);
    assert_eq!(
        api.activity_queries(),
        vec![(
            JOB,
            ActivityQuery {
                limit: ACTIVITY_PAGE_SIZE,
                cursor_id: None
            }
        )]
    );
}

#[tokio::test]
async fn scripted_two_page_feed_ends_with_all_items() {
    let api = FakeJobsApi::new();
    api.script_page(events_desc(140, 121), Some(120));
    api.script_page(events_desc(120, 106), None);
    let pager = pager_over(&api);

    assert_eq!(
        pager.load(LoadRequest::reset()).await,
        LoadOutcome::Loaded { added: 20 }
    );
    assert_eq!(
        pager.load(LoadRequest::after(120)).await,
        LoadOutcome::Loaded { added: 15 }
    );

    let view = pager.snapshot().await;
    assert_eq!(view.items.len(), 35);
    assert!(!view.has_more);
    assert_eq!(view.cursor, None);
    let queries = api.activity_queries();
    assert_eq!(queries[0].1.cursor_id, None);
    assert_eq!(queries[1].1.cursor_id, Some(120));
    assert!(queries.iter().all(|(_, query)| query.limit == 20));
}

#[tokio::test]
async fn walking_every_cursor_visits_each_event_once() {
    for total in [0_i64, 1, 19, 20, 21, 40, 57, 100] {
        let api = FakeJobsApi::new();
        api.seed_activity(JOB, total);
        let pager = pager_over(&api);

        pager.load(LoadRequest::reset()).await;
        while pager.has_more().await {
            assert!(matches!(
                pager.load_more().await,
                LoadOutcome::Loaded { .. }
            ));
        }

        let view = pager.snapshot().await;
        let seen: HashSet<i64> = ids(&view).into_iter().collect();
        assert_eq!(view.items.len() as i64, total, "feed of {total}");
        assert_eq!(seen.len() as i64, total, "duplicates in feed of {total}");
        assert_eq!(ids(&view), (1..=total).rev().collect::<Vec<_>>());

        let expected_requests = std::cmp::max(1, (total as usize).div_ceil(20));
        assert!(api.call_count("list_job_activity") <= expected_requests + 1);
    }
}

#[tokio::test]
async fn overlapping_boundary_event_is_kept_once() {
    let api = FakeJobsApi::new();
    api.script_page(events_desc(30, 11), Some(11));
    // Server repeats event 11 at the top of the next page.
    api.script_page(events_desc(11, 8), None);
    let pager = pager_over(&api);

    pager.load(LoadRequest::reset()).await;
    let outcome = pager.load_more().await;

    assert_eq!(outcome, LoadOutcome::Loaded { added: 3 });
    let view = pager.snapshot().await;
    assert_eq!(view.items.len(), 23);
    assert_eq!(ids(&view).iter().filter(|id| **id == 11).count(), 1);
    assert_eq!(ids(&view), (8..=30).rev().collect::<Vec<_>>());
}

#[tokio::test]
async fn reset_adopts_fresh_newest_page() {
    let api = FakeJobsApi::new();
    api.seed_activity(JOB, 25);
    let pager = pager_over(&api);
    pager.load(LoadRequest::reset()).await;
    pager.load_more().await;
    assert_eq!(pager.snapshot().await.items.len(), 25);

    let newest = api.push_activity(JOB, "Status moved to offer");
    pager.load(LoadRequest::reset()).await;

    let view = pager.snapshot().await;
    assert_eq!(view.items.len(), 20);
    assert_eq!(view.items[0], newest);
    assert_eq!(view.cursor, Some(7));
}

#[tokio::test]
async fn non_reset_initial_load_merges_without_duplicates() {
    let api = FakeJobsApi::new();
    api.seed_activity(JOB, 5);
    let pager = pager_over(&api);
    pager.load(LoadRequest::initial()).await;
    api.push_activity(JOB, "new");

    let outcome = pager.load(LoadRequest::initial()).await;

    assert_eq!(outcome, LoadOutcome::Loaded { added: 1 });
    assert_eq!(pager.snapshot().await.items.len(), 6);
}

#[tokio::test]
async fn failed_page_keeps_window_and_records_error() {
    let api = FakeJobsApi::new();
    api.seed_activity(JOB, 30);
    let pager = pager_over(&api);
    pager.load(LoadRequest::reset()).await;
    let before = pager.snapshot().await;

    api.fail("list_job_activity", "network down");
    let outcome = pager.load_more().await;

    assert_eq!(outcome, LoadOutcome::Failed("network down".to_string()));
    let after = pager.snapshot().await;
    assert_eq!(after.items, before.items);
    assert_eq!(after.cursor, before.cursor);
    assert_eq!(after.error.as_deref(), Some("network down"));
    assert!(!after.loading_more);

    api.recover("list_job_activity");
    pager.load_more().await;
    let recovered = pager.snapshot().await;
    assert_eq!(recovered.items.len(), 30);
    assert_eq!(recovered.error, None);
}

#[tokio::test]
async fn second_load_while_in_flight_is_a_noop() {
    let api = FakeJobsApi::new();
    api.seed_activity(JOB, 50);
    let pager = pager_over(&api);

    let (first, second) = tokio::join!(
        pager.load(LoadRequest::reset()),
        pager.load(LoadRequest::reset())
    );

    assert_eq!(first, LoadOutcome::Loaded { added: 20 });
    assert_eq!(second, LoadOutcome::Skipped);
    assert_eq!(api.call_count("list_job_activity"), 1);
    let view = pager.snapshot().await;
    assert_eq!(view.items.len(), 20);
    assert_eq!(view.cursor, Some(31));
}

#[tokio::test]
async fn retarget_drops_response_for_previous_job() {
    let api = FakeJobsApi::new();
    api.seed_activity(JOB, 10);
    let pager = pager_over(&api);

    let (outcome, _) = tokio::join!(pager.load(LoadRequest::reset()), pager.retarget(JobId(8)));

    assert_eq!(outcome, LoadOutcome::Stale);
    let view = pager.snapshot().await;
    assert_eq!(view.job_id, Some(JobId(8)));
    assert!(view.items.is_empty());
    assert!(!view.loading_initial);
}

#[tokio::test]
async fn untargeted_pager_skips_loads() {
    let api = FakeJobsApi::new();
    let pager = ActivityPager::new(api.clone());

    assert_eq!(pager.load(LoadRequest::reset()).await, LoadOutcome::Skipped);
    assert_eq!(pager.load_more().await, LoadOutcome::Skipped);
    assert!(api.calls().is_empty());
    assert_eq!(event(1).id, ActivityId(1));
}
