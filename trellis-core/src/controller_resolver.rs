// Orchestration of one controller run

use crate::action_chain::{get_mapped_action, has_mapped_action};
use crate::executor::process_action;
use crate::filter::process_filters;
use crate::logging::debug;
use crate::{
    ChainState, ChainValue, ControllerDescriptor, Provider, Request, RequestContext, Result, Scope,
    Stage,
};
use std::sync::Arc;
use std::time::Instant;

/// Runs the filters and stages of one controller for one request.
pub struct ControllerResolver {
    context: Arc<RequestContext>,
    state: Arc<ChainState>,
    stages: Arc<[Stage]>,
    providers: Vec<Provider>,
}

impl ControllerResolver {
    pub fn new(context: Arc<RequestContext>, state: ChainState) -> Self {
        Self {
            context,
            state: Arc::new(state),
            stages: Stage::ALL.into(),
            providers: Vec::new(),
        }
    }

    /// Restrict the optional stages that run. `Action` always runs.
    pub fn with_stages(mut self, stages: Arc<[Stage]>) -> Self {
        self.stages = stages;
        self
    }

    /// Extra providers made visible to the controller scope.
    pub fn with_providers(mut self, providers: Vec<Provider>) -> Self {
        self.providers = providers;
        self
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    /// The handle controllers receive for this run.
    pub fn request(&self) -> Request {
        Request::new(self.context.clone(), self.state.clone())
    }

    pub fn stop_chain(&self) {
        self.state.stop();
    }

    pub fn is_chain_stopped(&self) -> bool {
        self.state.is_stopped()
    }

    fn stage_enabled(&self, stage: Stage) -> bool {
        stage == Stage::Action || self.stages.contains(&stage)
    }

    /// Build the per-request controller scope under `parent` and run the
    /// before filters, the five stages and the after filters in order.
    ///
    /// The scope is destroyed when the request is torn down.
    pub async fn process_controller(
        &self,
        parent: &Scope,
        controller: &ControllerDescriptor,
    ) -> Result<ChainValue> {
        let mut providers = self.providers.clone();
        providers.extend(controller.providers.iter().cloned());
        providers.push(Provider::value(self.request()));
        providers.push(controller.provider());

        let scope = parent.child(controller.type_name, providers)?;
        let teardown_scope = scope.clone();
        self.context.on_teardown(move || teardown_scope.destroy());

        let route = self.state.route();
        let action = self.state.action();
        let has_filters = !controller.filters.is_empty();
        let mut chain = ChainValue::Null;

        if has_filters {
            chain = process_filters(&scope, controller, &self.state, chain, false).await?;
        }

        for stage in Stage::ALL {
            if !self.stage_enabled(stage) || self.state.is_stopped() {
                continue;
            }
            if stage != Stage::Action && !has_mapped_action(controller, action, stage) {
                continue;
            }

            let mapping = get_mapped_action(controller, action, stage, route)?;
            let start = Instant::now();
            chain = process_action(&scope, controller, mapping, &self.state, &self.context, &chain)?
                .await?;
            debug!(
                request_id = %self.context.id(),
                controller = controller.type_name,
                stage = stage.decorator(),
                action,
                elapsed_us = start.elapsed().as_micros() as u64,
                "Stage processed"
            );
        }

        if has_filters && !self.state.is_stopped() {
            chain = process_filters(&scope, controller, &self.state, chain, true).await?;
        }

        Ok(chain)
    }
}
