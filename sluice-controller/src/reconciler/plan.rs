use sluice_core::clock::Clock;
use sluice_core::config::Defaults;
use sluice_core::domain::{PipelineRun, PipelineTaskNames, PipelineTaskRunSpec};

/// What the executor may do for a run after this pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunPlan {
    /// Effective settings for each main task, in pipeline order
    pub tasks: Vec<PipelineTaskRunSpec>,
    /// Effective settings for each finally task, in pipeline order
    pub finally: Vec<PipelineTaskRunSpec>,
    pub tasks_timed_out: bool,
    pub finally_timed_out: bool,
    /// New main tasks may be started
    pub start_new_tasks: bool,
    /// The main phase is being wound down and finally tasks should start
    pub run_finally: bool,
}

impl RunPlan {
    pub fn build(
        run: &PipelineRun,
        names: &PipelineTaskNames,
        defaults: &Defaults,
        clock: &dyn Clock,
    ) -> Self {
        let resolve = |name: &String| {
            let mut spec = run.get_task_run_spec(name);
            if spec.service_account_name.is_empty() {
                spec.service_account_name = defaults.default_service_account.clone();
            }
            spec
        };

        let tasks_timed_out = run.have_tasks_timed_out(clock);
        let finally_timed_out = run.has_finally_timed_out(clock);
        let winding_down =
            tasks_timed_out || run.is_gracefully_cancelled() || run.is_gracefully_stopped();

        Self {
            tasks: names.tasks.iter().map(resolve).collect(),
            finally: names.finally.iter().map(resolve).collect(),
            tasks_timed_out,
            finally_timed_out,
            start_new_tasks: !winding_down,
            run_finally: winding_down && !finally_timed_out && !names.finally.is_empty(),
        }
    }
}
