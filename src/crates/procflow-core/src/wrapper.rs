//! Adapter presenting a group through the [`Process`] contract.

use crate::error::Result;
use crate::group::MultiProcessGroup;
use crate::process::{Payload, Process};
use async_trait::async_trait;
use procflow_env::SharedEnvironment;
use std::fmt;

/// Wraps exactly one [`MultiProcessGroup`] so it can be chained, nested in other
/// groups, or registered like a single process.
///
/// Executing the wrapper runs the group and returns its result list serialized as a
/// JSON array of [`ProcessResult`](crate::ProcessResult)s.
#[derive(Clone)]
pub struct GroupWrapper {
    id: String,
    name: String,
    group: MultiProcessGroup,
}

impl GroupWrapper {
    /// Wrap `group`.
    pub fn new(group: MultiProcessGroup) -> Self {
        Self {
            id: format!("wrapper_{}", group.id()),
            name: group.display_name(),
            group,
        }
    }

    /// The wrapped group.
    pub fn group(&self) -> &MultiProcessGroup {
        &self.group
    }

    /// Unwrap back into the group.
    pub fn into_group(self) -> MultiProcessGroup {
        self.group
    }
}

impl fmt::Debug for GroupWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupWrapper")
            .field("id", &self.id)
            .field("group", &self.group)
            .finish()
    }
}

#[async_trait]
impl Process for GroupWrapper {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn parallel_safe(&self) -> bool {
        self.group.parallel_safe()
    }

    fn environment(&self) -> Option<SharedEnvironment> {
        self.group.environment()
    }

    // Members validate their own resources when they run.
    fn validate_resources(&self) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, input: Payload) -> Result<Payload> {
        let results = self.group.execute(input).await?;
        Ok(serde_json::to_value(results)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::SimProcess;
    use crate::result::ProcessResult;
    use procflow_env::{SimEnvironment, SimResource};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_wrapper_delegates_to_group() {
        let env = SimEnvironment::shared();
        let group = MultiProcessGroup::new(vec![
            Arc::new(SimProcess::timed("x", 1.0).with_environment(env.clone())) as Arc<dyn Process>,
            Arc::new(SimProcess::timed("y", 2.0).with_environment(env.clone())),
        ])
        .unwrap();
        let group_id = group.id().to_string();

        let wrapper = GroupWrapper::new(group);
        assert_eq!(wrapper.id(), format!("wrapper_{group_id}"));
        assert_eq!(wrapper.name(), "[x & y]");

        let out = wrapper.execute(json!({"lot": 3})).await.unwrap();
        let results: Vec<ProcessResult> = serde_json::from_value(out).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success && r.payload == json!({"lot": 3})));
    }

    #[test]
    fn test_wrapper_skips_resource_validation() {
        let member = SimProcess::timed("stamp", 1.0).with_resource(SimResource::new("ghost", 0));
        assert!(member.validate_resources().is_err());

        let group = MultiProcessGroup::new(vec![Arc::new(member) as Arc<dyn Process>]).unwrap();
        assert!(GroupWrapper::new(group).validate_resources().is_ok());
    }
}
