//! Sequential multi-target extraction over one shared report session.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Serialize, Serializer};
use tracing::{error, info, info_span, warn};

use crate::artifacts::ArtifactSource;
use crate::error::ExtractionError;
use crate::models::{BatchSummary, Extracted, ExtractionResult, ExtractionTarget};
use crate::parser::classify_and_parse;
use crate::session::ReportSession;

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Working states of one target. Each target ends `Succeeded` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Configuring,
    Triggering,
    AwaitingArtifact,
    Classified,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Configuring => "configuring",
            Self::Triggering => "triggering",
            Self::AwaitingArtifact => "awaiting-artifact",
            Self::Classified => "classified",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptReason {
    StopRequested,
    NavigationLost,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    BatchStarted { total: usize },
    TargetStarted { index: usize, total: usize, key: String },
    StageEntered { key: String, stage: Stage },
    TargetFinished { index: usize, key: String, success: bool, reason: Option<String> },
    NavigationRecovered { after: String },
    BatchInterrupted { reason: InterruptReason, remaining: usize },
    BatchFinished { summary: BatchSummary },
}

/// Receives batch progress. Separate from logging so a UI can render it.
pub trait ProgressSink {
    fn emit(&mut self, event: &ProgressEvent);
}

impl<F: FnMut(&ProgressEvent)> ProgressSink for F {
    fn emit(&mut self, event: &ProgressEvent) {
        self(event)
    }
}

/// Sink that drops every event.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&mut self, _event: &ProgressEvent) {}
}

/// Cloneable flag checked between targets, never mid-target.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Batch outcome
// ---------------------------------------------------------------------------

/// Everything a batch run reports: the summary plus one result per key,
/// in first-seen order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    #[serde(flatten)]
    pub summary: BatchSummary,
    #[serde(serialize_with = "results_as_map")]
    pub results_by_key: Vec<ExtractionResult>,
}

impl BatchOutcome {
    /// Keeps one result per key; a later result for the same key replaces
    /// the earlier one in place.
    fn new(results: Vec<ExtractionResult>) -> Self {
        let mut by_key: Vec<ExtractionResult> = Vec::with_capacity(results.len());
        for result in results {
            let key = result.key();
            match by_key.iter().position(|r| r.key() == key) {
                Some(i) => by_key[i] = result,
                None => by_key.push(result),
            }
        }
        Self {
            summary: BatchSummary::from_results(&by_key),
            results_by_key: by_key,
        }
    }

    pub fn get(&self, key: &str) -> Option<&ExtractionResult> {
        self.results_by_key.iter().find(|r| r.key() == key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.results_by_key.iter().map(ExtractionResult::key).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExtractionResult> {
        self.results_by_key.iter().filter(|r| r.is_failed())
    }
}

fn results_as_map<S: Serializer>(results: &[ExtractionResult], s: S) -> Result<S::Ok, S::Error> {
    s.collect_map(results.iter().map(|r| (r.key(), r)))
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs targets one after another against a borrowed session. The session
/// is never closed here.
pub struct Orchestrator<'a, S: ReportSession + ?Sized, A: ArtifactSource + ?Sized> {
    session: &'a mut S,
    artifacts: &'a mut A,
    stop: StopHandle,
}

impl<'a, S: ReportSession + ?Sized, A: ArtifactSource + ?Sized> Orchestrator<'a, S, A> {
    pub fn new(session: &'a mut S, artifacts: &'a mut A) -> Self {
        Self {
            session,
            artifacts,
            stop: StopHandle::new(),
        }
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Processes `targets` in order. Per-target failures are recorded, never
    /// returned; only a lost navigation context ends the batch early, and
    /// then every unprocessed target is marked `navigation-interrupted`.
    pub fn run_batch(
        &mut self,
        targets: Vec<ExtractionTarget>,
        progress: &mut dyn ProgressSink,
    ) -> BatchOutcome {
        let total = targets.len();
        info!(total, "batch started");
        progress.emit(&ProgressEvent::BatchStarted { total });

        let mut results: Vec<ExtractionResult> = Vec::with_capacity(total);
        let mut consumed: HashSet<PathBuf> = HashSet::new();
        let mut pending = targets.into_iter().enumerate().peekable();

        while let Some((index, target)) = pending.next() {
            if self.stop.is_stop_requested() {
                let remaining: Vec<ExtractionTarget> =
                    std::iter::once(target).chain(pending.by_ref().map(|(_, t)| t)).collect();
                warn!(remaining = remaining.len(), "stop requested, skipping remaining targets");
                progress.emit(&ProgressEvent::BatchInterrupted {
                    reason: InterruptReason::StopRequested,
                    remaining: remaining.len(),
                });
                results.extend(remaining.into_iter().map(ExtractionResult::not_attempted));
                break;
            }

            let key = target.key();
            progress.emit(&ProgressEvent::TargetStarted {
                index,
                total,
                key: key.clone(),
            });

            let result = {
                let _span = info_span!("target", target_key = %key).entered();
                self.run_target(target, &mut consumed, progress)
            };

            let configuration_failed =
                matches!(result.error(), Some(ExtractionError::Configuration(_)));
            progress.emit(&ProgressEvent::TargetFinished {
                index,
                key: key.clone(),
                success: result.success(),
                reason: result.error().map(ExtractionError::reason),
            });
            results.push(result);

            if pending.peek().is_none() || self.stop.is_stop_requested() {
                continue;
            }
            // The parameter screen is still up after a configuration failure.
            if configuration_failed {
                continue;
            }
            if !self.recover_navigation(&key, progress) {
                let remaining: Vec<ExtractionTarget> = pending.by_ref().map(|(_, t)| t).collect();
                error!(
                    after = %key,
                    remaining = remaining.len(),
                    "navigation lost, marking remaining targets failed"
                );
                progress.emit(&ProgressEvent::BatchInterrupted {
                    reason: InterruptReason::NavigationLost,
                    remaining: remaining.len(),
                });
                results.extend(remaining.into_iter().map(|t| {
                    ExtractionResult::failed(t, ExtractionError::NavigationInterrupted, None)
                }));
                break;
            }
        }

        let outcome = BatchOutcome::new(results);
        info!(
            total = outcome.summary.total,
            succeeded = outcome.summary.succeeded,
            failed = outcome.summary.failed,
            success_rate = outcome.summary.success_rate,
            "batch finished"
        );
        progress.emit(&ProgressEvent::BatchFinished {
            summary: outcome.summary,
        });
        outcome
    }

    fn run_target(
        &mut self,
        target: ExtractionTarget,
        consumed: &mut HashSet<PathBuf>,
        progress: &mut dyn ProgressSink,
    ) -> ExtractionResult {
        let key = target.key();
        let mut enter = |stage: Stage| {
            info!(%stage, "stage");
            progress.emit(&ProgressEvent::StageEntered {
                key: key.clone(),
                stage,
            });
        };

        enter(Stage::Configuring);
        if let Err(e) = self.session.configure(&target) {
            warn!(error = %e, "configuration failed");
            return ExtractionResult::failed(target, ExtractionError::Configuration(e.to_string()), None);
        }

        enter(Stage::Triggering);
        if let Err(e) = self.session.trigger() {
            warn!(error = %e, "trigger failed");
            return ExtractionResult::failed(target, ExtractionError::Trigger(e.to_string()), None);
        }

        enter(Stage::AwaitingArtifact);
        let Some(path) = self.artifacts.await_artifact(consumed) else {
            warn!("no artifact appeared");
            return ExtractionResult::failed(target, ExtractionError::ArtifactTimeout, None);
        };
        consumed.insert(path.clone());

        enter(Stage::Classified);
        match classify_and_parse(&path) {
            Ok(report) => {
                info!(path = %path.display(), rows = report.table.row_count(), "target succeeded");
                ExtractionResult::succeeded(
                    target,
                    Extracted {
                        table: report.table,
                        company_info: report.company_info,
                        artifact_path: path,
                    },
                )
            }
            Err(e) => {
                let err = ExtractionError::from(&e);
                warn!(path = %path.display(), reason = %err, transient = e.is_transient(), "artifact rejected");
                ExtractionResult::failed(target, err, Some(path))
            }
        }
    }

    /// Back to the parameter screen, trying the menu path once if the direct
    /// return fails.
    fn recover_navigation(&mut self, after: &str, progress: &mut dyn ProgressSink) -> bool {
        let Err(first) = self.session.return_to_parameters() else {
            return true;
        };
        warn!(after, error = %first, "return to parameters failed, re-navigating from menu");
        match self.session.renavigate_from_menu() {
            Ok(()) => {
                info!(after, "navigation recovered");
                progress.emit(&ProgressEvent::NavigationRecovered {
                    after: after.to_string(),
                });
                true
            }
            Err(e) => {
                error!(after, error = %e, "menu re-navigation failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::models::{DateRange, Outcome, SelectionCriteria};
    use crate::planner::build_targets;
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    #[derive(Default)]
    struct MockSession {
        log: Log,
        fail_configure: HashSet<String>,
        fail_trigger: HashSet<String>,
        /// Number of `return_to_parameters` calls that succeed before failing.
        returns_before_failure: Option<usize>,
        menu_fails: bool,
        current: String,
        returns: usize,
        stop_after_configure: Option<(String, StopHandle)>,
    }

    impl ReportSession for MockSession {
        fn configure(&mut self, target: &ExtractionTarget) -> std::result::Result<(), SessionError> {
            self.current = target.key();
            self.log.borrow_mut().push(format!("configure {}", self.current));
            if let Some((key, stop)) = &self.stop_after_configure {
                if *key == self.current {
                    stop.request_stop();
                }
            }
            if self.fail_configure.contains(&self.current) {
                return Err(SessionError::ElementNotFound {
                    role: "dropdown 'Empresa'".into(),
                });
            }
            Ok(())
        }

        fn trigger(&mut self) -> std::result::Result<(), SessionError> {
            self.log.borrow_mut().push(format!("trigger {}", self.current));
            if self.fail_trigger.contains(&self.current) {
                return Err(SessionError::Verification("button disabled".into()));
            }
            Ok(())
        }

        fn return_to_parameters(&mut self) -> std::result::Result<(), SessionError> {
            self.log.borrow_mut().push("return".into());
            self.returns += 1;
            match self.returns_before_failure {
                Some(limit) if self.returns > limit => Err(SessionError::ElementNotFound {
                    role: "ledger report link".into(),
                }),
                _ => Ok(()),
            }
        }

        fn renavigate_from_menu(&mut self) -> std::result::Result<(), SessionError> {
            self.log.borrow_mut().push("menu".into());
            if self.menu_fails {
                Err(SessionError::ElementNotFound {
                    role: "accounting menu".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    /// Hands out one queued payload per await; `None` simulates a timeout.
    struct MockArtifacts {
        log: Log,
        dir: PathBuf,
        payloads: VecDeque<Option<Vec<u8>>>,
        written: usize,
        stale: Option<PathBuf>,
    }

    impl MockArtifacts {
        fn new(log: Log, dir: &Path, payloads: Vec<Option<Vec<u8>>>) -> Self {
            Self {
                log,
                dir: dir.to_path_buf(),
                payloads: payloads.into(),
                written: 0,
                stale: None,
            }
        }
    }

    impl ArtifactSource for MockArtifacts {
        fn await_artifact(&mut self, consumed: &HashSet<PathBuf>) -> Option<PathBuf> {
            self.log.borrow_mut().push("await".into());
            if let Some(stale) = &self.stale {
                if !consumed.contains(stale) {
                    return Some(stale.clone());
                }
            }
            let payload = self.payloads.pop_front().flatten()?;
            self.written += 1;
            let path = self.dir.join(format!("LIBRO MAYOR {}.xls", self.written));
            std::fs::write(&path, payload).unwrap();
            Some(path)
        }
    }

    fn ledger_csv(rows: usize) -> Vec<u8> {
        let mut out = String::from("FECHA;COMPROBANTE;GLOSA;DEBE;HABER;SALDO\n");
        for i in 0..rows {
            out.push_str(&format!("{:02}/01/2025;I-{i};Movimiento {i};1.000;0;{}.000\n", i + 1, i + 1));
        }
        out.into_bytes()
    }

    fn empty_ledger_html() -> Vec<u8> {
        br#"<html xmlns:x="urn:schemas-microsoft-com:office:excel"><body><table border="1">
<tr><td>FECHA</td><td>COMPROBANTE</td><td>RUT</td><td>GLOSA</td><td>DEBE</td><td>HABER</td><td>SALDO</td></tr>
</table></body></html>"#
            .to_vec()
    }

    fn criteria() -> SelectionCriteria {
        SelectionCriteria::new(
            DateRange::new(
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            ),
            "EXCEL",
        )
    }

    fn targets(companies: &[&str], accounts: &[&str]) -> Vec<ExtractionTarget> {
        let companies: Vec<String> = companies.iter().map(|s| s.to_string()).collect();
        let accounts: Vec<String> = accounts.iter().map(|s| s.to_string()).collect();
        build_targets(&companies, &accounts, &criteria())
    }

    fn ok_payloads(n: usize) -> Vec<Option<Vec<u8>>> {
        (0..n).map(|_| Some(ledger_csv(2))).collect()
    }

    #[test]
    fn test_two_companies_one_account_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::default();
        let mut session = MockSession {
            log: log.clone(),
            ..Default::default()
        };
        let mut artifacts = MockArtifacts::new(
            log.clone(),
            dir.path(),
            vec![Some(ledger_csv(10)), Some(empty_ledger_html())],
        );

        let outcome = Orchestrator::new(&mut session, &mut artifacts)
            .run_batch(targets(&["A", "B"], &["X"]), &mut NoProgress);

        assert_eq!(outcome.keys(), vec!["A - X", "B - X"]);
        assert_eq!(outcome.summary.total, 2);
        assert_eq!(outcome.summary.succeeded, 2);
        assert_eq!(outcome.summary.failed, 0);
        assert_eq!(outcome.summary.success_rate, 100.0);
        assert_eq!(outcome.get("A - X").unwrap().row_count(), 10);
        assert_eq!(outcome.get("B - X").unwrap().row_count(), 0);
        for result in &outcome.results_by_key {
            assert!(result.table().unwrap().is_rectangular());
        }
    }

    #[test]
    fn test_cross_product_order_and_strict_sequencing() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::default();
        let mut session = MockSession {
            log: log.clone(),
            ..Default::default()
        };
        let mut artifacts = MockArtifacts::new(log.clone(), dir.path(), ok_payloads(4));

        let outcome = Orchestrator::new(&mut session, &mut artifacts)
            .run_batch(targets(&["A", "B"], &["X", "Y"]), &mut NoProgress);

        assert_eq!(outcome.keys(), vec!["A - X", "A - Y", "B - X", "B - Y"]);
        let expected: Vec<String> = [
            "configure A - X", "trigger A - X", "await", "return",
            "configure A - Y", "trigger A - Y", "await", "return",
            "configure B - X", "trigger B - X", "await", "return",
            "configure B - Y", "trigger B - Y", "await",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(*log.borrow(), expected);
    }

    #[test]
    fn test_navigation_loss_marks_remaining_targets() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::default();
        let mut session = MockSession {
            log: log.clone(),
            returns_before_failure: Some(1),
            menu_fails: true,
            ..Default::default()
        };
        let mut artifacts = MockArtifacts::new(log.clone(), dir.path(), ok_payloads(5));

        let outcome = Orchestrator::new(&mut session, &mut artifacts)
            .run_batch(targets(&["A", "B", "C", "D", "E"], &["X"]), &mut NoProgress);

        assert_eq!(outcome.summary.total, 5);
        assert_eq!(outcome.summary.succeeded, 2);
        assert_eq!(outcome.summary.failed, 3);
        for key in ["C - X", "D - X", "E - X"] {
            let r = outcome.get(key).unwrap();
            assert_eq!(r.error(), Some(&ExtractionError::NavigationInterrupted));
            assert_eq!(r.error().unwrap().reason(), "navigation-interrupted");
        }
        // no target was configured after the loss
        assert_eq!(
            log.borrow().iter().filter(|c| c.starts_with("configure")).count(),
            2
        );
        assert_eq!(log.borrow().last().unwrap(), "menu");
    }

    #[test]
    fn test_menu_renavigation_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::default();
        let mut session = MockSession {
            log: log.clone(),
            returns_before_failure: Some(0),
            ..Default::default()
        };
        let mut artifacts = MockArtifacts::new(log.clone(), dir.path(), ok_payloads(3));
        let mut events = Vec::new();
        let mut sink = |e: &ProgressEvent| events.push(e.clone());

        let outcome = Orchestrator::new(&mut session, &mut artifacts)
            .run_batch(targets(&["A", "B", "C"], &["X"]), &mut sink);

        assert_eq!(outcome.summary.succeeded, 3);
        let recovered = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::NavigationRecovered { .. }))
            .count();
        assert_eq!(recovered, 2);
    }

    #[test]
    fn test_configuration_failure_skips_navigation() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::default();
        let mut session = MockSession {
            log: log.clone(),
            fail_configure: ["A - X".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let mut artifacts = MockArtifacts::new(log.clone(), dir.path(), ok_payloads(1));

        let outcome = Orchestrator::new(&mut session, &mut artifacts)
            .run_batch(targets(&["A", "B"], &["X"]), &mut NoProgress);

        assert_eq!(
            *log.borrow(),
            vec!["configure A - X", "configure B - X", "trigger B - X", "await"]
        );
        let failed = outcome.get("A - X").unwrap();
        assert!(matches!(
            failed.error(),
            Some(ExtractionError::Configuration(m)) if m.contains("Empresa")
        ));
        assert!(outcome.get("B - X").unwrap().success());
    }

    #[test]
    fn test_trigger_failure_and_timeout_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::default();
        let mut session = MockSession {
            log: log.clone(),
            fail_trigger: ["A - X".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let mut artifacts = MockArtifacts::new(log.clone(), dir.path(), vec![None]);

        let outcome = Orchestrator::new(&mut session, &mut artifacts)
            .run_batch(targets(&["A", "B"], &["X"]), &mut NoProgress);

        assert!(matches!(
            outcome.get("A - X").unwrap().error(),
            Some(ExtractionError::Trigger(_))
        ));
        let timed_out = outcome.get("B - X").unwrap();
        assert_eq!(timed_out.error(), Some(&ExtractionError::ArtifactTimeout));
        assert_eq!(timed_out.error().unwrap().reason(), "no-artifact");
        assert_eq!(outcome.summary.success_rate, 0.0);
    }

    #[test]
    fn test_session_error_page_is_transient_format_failure() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::default();
        let mut session = MockSession {
            log: log.clone(),
            ..Default::default()
        };
        let page = b"<html><body>Su session ha expired, ingrese nuevamente</body></html>".to_vec();
        let mut artifacts = MockArtifacts::new(log.clone(), dir.path(), vec![Some(page)]);

        let outcome =
            Orchestrator::new(&mut session, &mut artifacts).run_batch(targets(&["A"], &["X"]), &mut NoProgress);

        let r = outcome.get("A - X").unwrap();
        assert_eq!(
            r.error(),
            Some(&ExtractionError::Format {
                reason: "generic-html: session, expired".into(),
                transient: true
            })
        );
        assert!(r.artifact_path().is_some());
    }

    #[test]
    fn test_consumed_artifact_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::default();
        let stale = dir.path().join("stale.xls");
        std::fs::write(&stale, ledger_csv(1)).unwrap();
        let mut session = MockSession {
            log: log.clone(),
            ..Default::default()
        };
        let mut artifacts = MockArtifacts::new(log.clone(), dir.path(), vec![None]);
        artifacts.stale = Some(stale.clone());

        let outcome = Orchestrator::new(&mut session, &mut artifacts)
            .run_batch(targets(&["A", "B"], &["X"]), &mut NoProgress);

        assert_eq!(outcome.get("A - X").unwrap().artifact_path(), Some(&stale));
        assert_eq!(
            outcome.get("B - X").unwrap().error(),
            Some(&ExtractionError::ArtifactTimeout)
        );
    }

    #[test]
    fn test_stop_leaves_rest_not_attempted() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::default();
        let stop = StopHandle::new();
        let mut session = MockSession {
            log: log.clone(),
            stop_after_configure: Some(("B - X".into(), stop.clone())),
            ..Default::default()
        };
        let mut artifacts = MockArtifacts::new(log.clone(), dir.path(), ok_payloads(4));
        let mut events = Vec::new();
        let mut sink = |e: &ProgressEvent| events.push(e.clone());

        let outcome = Orchestrator::new(&mut session, &mut artifacts)
            .with_stop_handle(stop)
            .run_batch(targets(&["A", "B", "C", "D"], &["X"]), &mut sink);

        assert_eq!(outcome.summary.total, 4);
        assert_eq!(outcome.summary.succeeded, 2);
        assert_eq!(outcome.summary.failed, 0);
        assert_eq!(outcome.summary.not_attempted(), 2);
        assert_eq!(outcome.get("C - X").unwrap().outcome, Outcome::NotAttempted);
        // B finished its target but no navigation followed the stop
        assert_eq!(log.borrow().last().unwrap(), "await");
        assert!(events.contains(&ProgressEvent::BatchInterrupted {
            reason: InterruptReason::StopRequested,
            remaining: 2
        }));
    }

    #[test]
    fn test_progress_events_follow_stages() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::default();
        let mut session = MockSession {
            log: log.clone(),
            ..Default::default()
        };
        let mut artifacts = MockArtifacts::new(log.clone(), dir.path(), ok_payloads(1));
        let mut events = Vec::new();
        let mut sink = |e: &ProgressEvent| events.push(e.clone());

        Orchestrator::new(&mut session, &mut artifacts).run_batch(targets(&["A"], &["X"]), &mut sink);

        let stages: Vec<Stage> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::StageEntered { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(
            stages,
            vec![
                Stage::Configuring,
                Stage::Triggering,
                Stage::AwaitingArtifact,
                Stage::Classified
            ]
        );
        assert!(matches!(events.first(), Some(ProgressEvent::BatchStarted { total: 1 })));
        assert!(matches!(events.last(), Some(ProgressEvent::BatchFinished { .. })));
    }

    #[test]
    fn test_retried_target_replaces_earlier_result() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::default();
        let mut session = MockSession {
            log: log.clone(),
            ..Default::default()
        };
        let mut artifacts = MockArtifacts::new(
            log.clone(),
            dir.path(),
            vec![None, Some(ledger_csv(2)), Some(ledger_csv(3))],
        );
        let mut batch = targets(&["A"], &["X", "Y"]);
        batch.push(batch[0].clone());

        let outcome = Orchestrator::new(&mut session, &mut artifacts).run_batch(batch, &mut NoProgress);

        assert_eq!(outcome.keys(), vec!["A - X", "A - Y"]);
        assert_eq!(outcome.summary.total, 2);
        assert_eq!(outcome.summary.succeeded, 2);
        assert_eq!(outcome.get("A - X").unwrap().row_count(), 3);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["results_by_key"].as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::default();
        let mut session = MockSession::default();
        let mut artifacts = MockArtifacts::new(log, dir.path(), vec![]);
        let outcome = Orchestrator::new(&mut session, &mut artifacts).run_batch(vec![], &mut NoProgress);
        assert_eq!(outcome.summary.total, 0);
        assert_eq!(outcome.summary.success_rate, 0.0);
    }

    #[test]
    fn test_outcome_serializes_results_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::default();
        let mut session = MockSession {
            log: log.clone(),
            ..Default::default()
        };
        let mut artifacts = MockArtifacts::new(log.clone(), dir.path(), vec![None]);
        let outcome =
            Orchestrator::new(&mut session, &mut artifacts).run_batch(targets(&["A"], &["X"]), &mut NoProgress);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["results_by_key"]["A - X"]["outcome"]["status"], "failed");
        assert_eq!(
            json["results_by_key"]["A - X"]["outcome"]["error"]["kind"],
            "artifact_timeout"
        );
    }
}
