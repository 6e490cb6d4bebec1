//! Execution engine - converges a plan in declaration order
//!
//! One pass, strictly sequential: each resource is queried, evaluated and,
//! when its action is required, handed to the [`ActionExecutor`]. Immediate
//! notifications run right after the resource that fired them; deferred
//! ones run once each after the last declared resource.

use crate::context::{ActionExecutor, ApplyContext, NoProgress, ProgressCallback, StateQuerier};
use crate::diff::action_required;
use crate::error::{Error, RunAborted};
use crate::notifier::{Notification, Notifier};
use crate::planner::ExecutionPlan;
use crate::report::{EntryStatus, ReportEntry, RunOutcome, RunReport, Trigger};
use crate::resource::Resource;
use crate::types::{Action, ExecuteOptions};

/// Converge a plan
///
/// # Arguments
/// * `plan` - Resources and notification edges, in declaration order
/// * `opts` - Execution options (dry_run, verbose)
/// * `querier` - Source of current state
/// * `executor` - Applies required actions
/// * `progress` - Progress callback
///
/// # Returns
/// The sealed run report, or [`RunAborted`] carrying the partial report
/// when validation or a non-ignorable failure stops the run.
#[allow(clippy::result_large_err)]
pub fn execute<Q, E, P>(
    plan: &ExecutionPlan,
    opts: &ExecuteOptions,
    querier: &Q,
    executor: &E,
    progress: &mut P,
) -> Result<RunReport, RunAborted>
where
    Q: StateQuerier + ?Sized,
    E: ActionExecutor + ?Sized,
    P: ProgressCallback + ?Sized,
{
    let mut report = RunReport::start(opts.dry_run);

    if let Err(error) = plan.validate() {
        log::error!("plan rejected: {error}");
        report.seal(RunOutcome::Aborted {
            error: error.to_string(),
        });
        return Err(RunAborted { report, error });
    }

    let run = Run {
        plan,
        opts,
        querier,
        executor,
        progress,
        notifier: Notifier::from_edges(plan.notifications()),
        report,
    };
    run.converge()
}

/// Converge without progress reporting
#[allow(clippy::result_large_err)]
pub fn execute_simple<Q, E>(
    plan: &ExecutionPlan,
    opts: &ExecuteOptions,
    querier: &Q,
    executor: &E,
) -> Result<RunReport, RunAborted>
where
    Q: StateQuerier + ?Sized,
    E: ActionExecutor + ?Sized,
{
    execute(plan, opts, querier, executor, &mut NoProgress)
}

struct Run<'a, Q: ?Sized, E: ?Sized, P: ?Sized> {
    plan: &'a ExecutionPlan,
    opts: &'a ExecuteOptions,
    querier: &'a Q,
    executor: &'a E,
    progress: &'a mut P,
    notifier: Notifier,
    report: RunReport,
}

impl<Q, E, P> Run<'_, Q, E, P>
where
    Q: StateQuerier + ?Sized,
    E: ActionExecutor + ?Sized,
    P: ProgressCallback + ?Sized,
{
    #[allow(clippy::result_large_err)]
    fn converge(mut self) -> Result<RunReport, RunAborted> {
        let plan = self.plan;
        self.progress.on_run_start(plan.len());

        for resource in plan.resources() {
            if let Err(error) = self.process(resource, resource.action, Trigger::Declared) {
                return Err(self.abort(error));
            }
        }

        while let Some(notification) = self.notifier.pop_deferred() {
            if let Err(error) = self.process_notification(notification) {
                return Err(self.abort(error));
            }
        }

        self.progress.on_run_complete();
        self.report.seal(RunOutcome::Converged);
        log::info!(
            "converged: {} changed of {} entries",
            self.report.summary().total_changes(),
            self.report.entries().len()
        );
        Ok(self.report)
    }

    fn process_notification(&mut self, notification: Notification) -> Result<(), Error> {
        let plan = self.plan;
        // Targets are resolved by plan validation
        let Some(target) = plan.get(&notification.target) else {
            return Err(Error::UnknownResource {
                notifier: notification.notified_by,
                target: notification.target,
            });
        };
        self.process(
            target,
            target.notified_action(),
            Trigger::Notified {
                by: notification.notified_by,
                timing: notification.timing,
            },
        )
    }

    /// pending -> evaluated -> {skipped | executed} -> notified -> done
    fn process(
        &mut self,
        resource: &Resource,
        action: Action,
        trigger: Trigger,
    ) -> Result<(), Error> {
        let id = resource.id();
        self.progress.on_resource_start(&id, &resource.description());

        if action == Action::Nothing {
            self.finish(
                resource,
                action,
                trigger,
                EntryStatus::Skipped {
                    reason: "runs only when notified".into(),
                },
            );
            return Ok(());
        }

        if matches!(trigger, Trigger::Notified { .. }) && self.notifier.has_executed(&id) {
            self.finish(
                resource,
                action,
                trigger,
                EntryStatus::Skipped {
                    reason: "already executed this run".into(),
                },
            );
            return Ok(());
        }

        let state = match self.querier.current_state(resource) {
            Ok(state) if state.kind() == resource.kind() => state,
            Ok(state) => {
                let error = Error::StateQuery {
                    resource: id,
                    message: format!("querier reported {} state", state.kind()),
                };
                return self.fail(resource, action, trigger, error);
            }
            Err(e) => {
                let error = Error::StateQuery {
                    resource: id,
                    message: format!("{e:#}"),
                };
                return self.fail(resource, action, trigger, error);
            }
        };

        if !action_required(resource, action, &state) {
            log::debug!("{id} is up to date");
            self.finish(resource, action, trigger, EntryStatus::UpToDate);
            return Ok(());
        }

        let changed = if self.opts.dry_run {
            log::info!("would {action} {id}");
            self.finish(resource, action, trigger, EntryStatus::WouldApply);
            true
        } else {
            log::info!("{action} {id}");
            let ctx = ApplyContext::new(action, self.opts.verbose);
            match self.executor.apply(resource, &ctx) {
                Ok(result) => {
                    let changed = result.is_change();
                    self.finish(resource, action, trigger, EntryStatus::Applied { result });
                    changed
                }
                Err(e) => {
                    let error = Error::ActionExecution {
                        resource: id,
                        message: format!("{e:#}"),
                    };
                    return self.fail(resource, action, trigger, error);
                }
            }
        };
        self.notifier.mark_executed(&id);

        for notification in self.notifier.fire(&id, changed) {
            self.process_notification(notification)?;
        }

        Ok(())
    }

    fn finish(&mut self, resource: &Resource, action: Action, trigger: Trigger, status: EntryStatus) {
        let id = resource.id();
        self.progress.on_resource_complete(&id, &status);
        let changed = status.is_change();
        self.report.record(ReportEntry {
            kind: id.kind,
            name: id.name,
            action,
            trigger,
            status,
            changed,
        });
    }

    fn fail(
        &mut self,
        resource: &Resource,
        action: Action,
        trigger: Trigger,
        error: Error,
    ) -> Result<(), Error> {
        self.finish(
            resource,
            action,
            trigger,
            EntryStatus::Failed {
                error: error.to_string(),
            },
        );
        if resource.ignore_failure {
            log::warn!("{error} (ignored)");
            Ok(())
        } else {
            Err(error)
        }
    }

    fn abort(mut self, error: Error) -> RunAborted {
        log::error!("{error}");
        self.progress.on_run_complete();
        self.report.seal(RunOutcome::Aborted {
            error: error.to_string(),
        });
        RunAborted {
            report: self.report,
            error,
        }
    }
}
