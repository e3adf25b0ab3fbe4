//! Tail a process log like `tail -f`
//!
//! Glue between [`LogReader`] and [`PollingController`]: every cycle is one
//! `refresh(false)`, and the loop ends when the process (or the followed
//! segment) stops being active.

use crate::error::TailError;
use crate::poller::{ErrorPolicy, PollOptions, PollingController};
use crate::reader::{LogReader, RefreshOutcome};
use concord_client::ConcordClient;
use log::warn;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Poll `reader` every `interval` and hand each refresh to `on_refresh`
///
/// Transient errors are recorded in the controller state and polling goes
/// on. A broken `Content-Range` protocol stops the loop. Once the controller
/// is stopped, a refresh still in flight is neither merged nor passed to
/// `on_refresh`.
pub fn follow<C, F>(
    reader: LogReader<C>,
    interval: Duration,
    on_refresh: F,
) -> PollingController<TailError>
where
    C: ConcordClient + 'static,
    F: Fn(&RefreshOutcome) + Send + Sync + 'static,
{
    let on_refresh = Arc::new(on_refresh);
    let poll_once = move |cancel: CancellationToken| {
        let reader = reader.clone();
        let on_refresh = Arc::clone(&on_refresh);
        async move {
            match reader.refresh_cancellable(false, &cancel).await {
                Ok(_) if cancel.is_cancelled() => Err(TailError::Cancelled),
                Ok(outcome) => {
                    on_refresh(&outcome);
                    Ok(outcome.keep_polling())
                }
                Err(TailError::Cancelled) => Err(TailError::Cancelled),
                Err(e) => {
                    warn!("Log refresh failed: {}", e);
                    Err(e)
                }
            }
        }
    };

    let controller = PollingController::new();
    controller.start_with(
        poll_once,
        PollOptions::new(interval).error_policy(ErrorPolicy::StopWhen(
            TailError::is_protocol_violation,
        )),
    );
    controller
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::LogTarget;
    use async_trait::async_trait;
    use concord_client::{
        InstanceId, LogChunk, LogRange, LogSegmentEntry, Pagination, PaginatedLogSegmentEntry,
        ProcessEntry, ProcessStatus, RequestError, SegmentFilter, SegmentId, SegmentStatus,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves scripted (status, chunk) pairs, one per round trip
    ///
    /// Status and log calls keep their own counters, so the order in which
    /// a round trip issues them does not matter.
    struct ScriptedClient {
        statuses: Vec<ProcessStatus>,
        chunks: Mutex<Vec<Option<concord_client::Result<LogChunk>>>>,
        process_calls: AtomicUsize,
        log_calls: AtomicUsize,
        segment_status: Option<SegmentStatus>,
        delay: Duration,
    }

    impl ScriptedClient {
        fn new(script: Vec<(ProcessStatus, concord_client::Result<LogChunk>)>) -> Self {
            let (statuses, chunks) = script
                .into_iter()
                .map(|(status, chunk)| (status, Some(chunk)))
                .unzip();
            Self {
                statuses,
                chunks: Mutex::new(chunks),
                process_calls: AtomicUsize::new(0),
                log_calls: AtomicUsize::new(0),
                segment_status: None,
                delay: Duration::ZERO,
            }
        }

        fn with_segment_status(mut self, status: SegmentStatus) -> Self {
            self.segment_status = Some(status);
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl ConcordClient for ScriptedClient {
        async fn get_process(&self, instance_id: &InstanceId) -> concord_client::Result<ProcessEntry> {
            let n = self.process_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProcessEntry {
                instance_id: instance_id.clone(),
                status: self.statuses[n],
                created_at: None,
                initiator: None,
            })
        }

        async fn get_log(
            &self,
            _instance_id: &InstanceId,
            _range: &LogRange,
        ) -> concord_client::Result<LogChunk> {
            let n = self.log_calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.chunks.lock().unwrap()[n]
                .take()
                .expect("script exhausted")
        }

        async fn get_segment_log(
            &self,
            instance_id: &InstanceId,
            _segment_id: SegmentId,
            range: &LogRange,
        ) -> concord_client::Result<LogChunk> {
            self.get_log(instance_id, range).await
        }

        async fn list_log_segments(
            &self,
            _instance_id: &InstanceId,
            page: Pagination,
            _filter: SegmentFilter,
        ) -> concord_client::Result<PaginatedLogSegmentEntry> {
            let segment = self.segment_status.map(|status| LogSegmentEntry {
                id: 7,
                correlation_id: None,
                name: "deploy".to_string(),
                created_at: chrono::Utc::now(),
                status: Some(status),
                status_updated_at: None,
                warnings: None,
                errors: None,
                parent_id: None,
                meta: None,
            });
            Ok(page.paginate(segment.into_iter().collect()))
        }
    }

    fn chunk(data: &str, low: u64, high: u64) -> concord_client::Result<LogChunk> {
        Ok(LogChunk {
            data: data.to_string(),
            range: LogRange {
                unit: Some("bytes".to_string()),
                low: Some(low),
                high: Some(high),
                length: Some(high),
            },
        })
    }

    fn follow_script(
        script: Vec<(ProcessStatus, concord_client::Result<LogChunk>)>,
    ) -> (
        LogReader<ScriptedClient>,
        PollingController<TailError>,
        Arc<Mutex<Vec<String>>>,
    ) {
        follow_client(
            ScriptedClient::new(script),
            LogTarget::Process(InstanceId::new("abc")),
        )
    }

    fn follow_client(
        client: ScriptedClient,
        target: LogTarget,
    ) -> (
        LogReader<ScriptedClient>,
        PollingController<TailError>,
        Arc<Mutex<Vec<String>>>,
    ) {
        let reader = LogReader::new(Arc::new(client), target);
        let printed = Arc::new(Mutex::new(Vec::new()));
        let controller = follow(reader.clone(), Duration::from_secs(5), {
            let printed = Arc::clone(&printed);
            move |outcome: &RefreshOutcome| {
                if let Some(text) = &outcome.appended {
                    printed.lock().unwrap().push(text.clone());
                }
            }
        });
        (reader, controller, printed)
    }

    #[tokio::test(start_paused = true)]
    async fn test_follows_until_process_finishes() {
        let (reader, controller, printed) = follow_script(vec![
            (ProcessStatus::Running, chunk("one\n", 0, 4)),
            (ProcessStatus::Running, chunk("", 4, 4)),
            (ProcessStatus::Running, chunk("two\n", 4, 8)),
            (ProcessStatus::Finished, chunk("", 8, 8)),
        ]);

        controller.finished().await;

        assert_eq!(*printed.lock().unwrap(), vec!["one\n", "two\n"]);
        assert_eq!(reader.state().lines, vec!["one\n", "two\n"]);
        assert_eq!(reader.state().status, Some(ProcessStatus::Finished));
        assert_eq!(controller.state().cycles, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_keeps_following() {
        let (reader, controller, _) = follow_script(vec![
            (ProcessStatus::Running, chunk("one\n", 0, 4)),
            (
                ProcessStatus::Running,
                Err(RequestError::new(502, "Bad Gateway (502)").into()),
            ),
            (ProcessStatus::Failed, chunk("two\n", 4, 8)),
        ]);

        controller.finished().await;

        assert_eq!(reader.state().lines, vec!["one\n", "two\n"]);
        assert!(controller.last_error().is_none());
        assert_eq!(controller.state().cycles, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_protocol_violation_stops_following() {
        let (reader, controller, _) = follow_script(vec![
            (ProcessStatus::Running, chunk("one\n", 0, 4)),
            (
                ProcessStatus::Running,
                Err(RequestError::missing_range(200).into()),
            ),
        ]);

        controller.finished().await;

        let error = controller.last_error().expect("error should be recorded");
        assert!(error.is_protocol_violation());
        assert_eq!(reader.state().lines, vec!["one\n"]);
        assert!(controller.state().finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_refresh_in_flight() {
        let client = ScriptedClient::new(vec![(ProcessStatus::Running, chunk("late\n", 0, 5))])
            .with_delay(Duration::from_millis(100));
        let (reader, controller, printed) =
            follow_client(client, LogTarget::Process(InstanceId::new("abc")));

        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.stop();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(printed.lock().unwrap().is_empty());
        assert!(reader.state().lines.is_empty());
        assert_eq!(reader.state().status, None);
        assert_eq!(controller.state().cycles, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_segment_stops_following() {
        let client = ScriptedClient::new(vec![
            (ProcessStatus::Running, chunk("segment done\n", 0, 13)),
            (ProcessStatus::Running, chunk("", 13, 13)),
        ])
        .with_segment_status(SegmentStatus::Ok);
        let (reader, controller, printed) = follow_client(
            client,
            LogTarget::Segment {
                instance_id: InstanceId::new("abc"),
                segment_id: 7,
            },
        );

        controller.finished().await;

        assert_eq!(*printed.lock().unwrap(), vec!["segment done\n"]);
        assert_eq!(reader.state().status, Some(ProcessStatus::Running));
        assert_eq!(reader.state().segment_status, Some(SegmentStatus::Ok));
        assert_eq!(controller.state().cycles, 1);
    }
}
