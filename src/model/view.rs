//! Per-tool view over the task tree

use std::sync::Arc;

use crate::service::RemoteService;

use super::tree::{NodeId, TaskRef, Tree};

/// A tool and its tests, with an optional name filter
#[derive(Debug, Clone)]
pub struct ToolView {
    tool: TaskRef,
    tests: Vec<TaskRef>,
    filter: String,
}

impl ToolView {
    /// View of a tool node; `None` if the node is not a tool
    pub fn new(tree: &Arc<Tree>, node: NodeId) -> Option<Self> {
        if tree.depth(node) != 1 {
            return None;
        }

        let tool = tree.task_ref(node)?;
        let tests = tree
            .children(node)
            .iter()
            .filter_map(|&child| tree.task_ref(child))
            .collect();

        Some(Self {
            tool,
            tests,
            filter: String::new(),
        })
    }

    /// One view per tool, in tree order
    pub fn all(tree: &Arc<Tree>) -> Vec<Self> {
        tree.tools()
            .iter()
            .filter_map(|&node| Self::new(tree, node))
            .collect()
    }

    pub fn id(&self) -> &str {
        &self.tool.id
    }

    pub fn tool_task(&self) -> &TaskRef {
        &self.tool
    }

    pub fn all_tasks(&self) -> Vec<TaskRef> {
        self.tests.clone()
    }

    pub fn set_filter(&mut self, filter: &str) {
        self.filter = filter.to_string();
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Tests whose display name contains the filter, ignoring case
    pub fn filtered_tasks(&self) -> Vec<TaskRef> {
        if self.filter.is_empty() {
            return self.all_tasks();
        }

        let needle = self.filter.to_lowercase();
        self.tests
            .iter()
            .filter(|task| task.name.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    pub fn test_task(&self, id: &str) -> Option<TaskRef> {
        self.tests.iter().find(|task| task.id == id).cloned()
    }

    /// Fetch the tool's report; empty when the call fails
    pub async fn report(&self, service: &dyn RemoteService) -> Vec<u8> {
        match service.report(&self.tool.invocation.endpoint).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(tool = %self.id(), error = %e, "Report call failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Error, Result};
    use crate::model::{Invocation, Task};
    use crate::service::{Endpoint, RunOutput};
    use async_trait::async_trait;

    fn task_on(object: &str, id: &str, name: &str) -> Task {
        let mut task = Task::new(
            id,
            Invocation::remote(Endpoint::for_object(&Default::default(), object)),
        );
        task.name = name.to_string();
        task
    }

    fn task(id: &str, name: &str) -> Task {
        task_on("network-tests", id, name)
    }

    fn network_view() -> ToolView {
        let mut tree = Tree::new();
        let node = tree.insert_tool(
            task_on("network", "network-diag", "Network"),
            vec![
                task("ping", "Ping Gateway"),
                task("dns", "DNS lookup"),
                task("route", "Default route"),
            ],
        );
        ToolView::new(&Arc::new(tree), node).unwrap()
    }

    fn ids(tasks: &[TaskRef]) -> Vec<&str> {
        tasks.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_only_tool_nodes_have_views() {
        let mut tree = Tree::new();
        let tool = tree.insert_tool(task("t", "T"), vec![task("a", "A")]);
        let tree = Arc::new(tree);

        assert!(ToolView::new(&tree, tree.root()).is_none());
        let test = tree.child(tool, 0).unwrap();
        assert!(ToolView::new(&tree, test).is_none());
        assert_eq!(ToolView::all(&tree).len(), 1);
    }

    #[test]
    fn test_empty_filter_returns_all_tasks() {
        let view = network_view();
        assert_eq!(view.id(), "network-diag");
        assert_eq!(view.tool_task().name, "Network");
        assert_eq!(ids(&view.filtered_tasks()), ids(&view.all_tasks()));
        assert_eq!(ids(&view.all_tasks()), vec!["ping", "dns", "route"]);
    }

    #[test]
    fn test_filter_is_case_insensitive_and_keeps_order() {
        let mut view = network_view();

        view.set_filter("GATEWAY");
        assert_eq!(ids(&view.filtered_tasks()), vec!["ping"]);

        view.set_filter("o");
        assert_eq!(ids(&view.filtered_tasks()), vec!["dns", "route"]);

        view.set_filter("nothing");
        assert!(view.filtered_tasks().is_empty());

        view.set_filter("");
        assert_eq!(view.filtered_tasks().len(), 3);
    }

    #[test]
    fn test_filter_matches_names_not_ids() {
        let mut view = network_view();
        view.set_filter("dns l");
        assert_eq!(ids(&view.filtered_tasks()), vec!["dns"]);
        view.set_filter("ping gateway");
        assert_eq!(ids(&view.filtered_tasks()), vec!["ping"]);
    }

    #[test]
    fn test_test_task_lookup_by_id() {
        let view = network_view();
        assert_eq!(view.test_task("dns").unwrap().name, "DNS lookup");
        assert!(view.test_task("DNS lookup").is_none());
    }

    struct ReportService(Result<Vec<u8>>);

    #[async_trait]
    impl RemoteService for ReportService {
        async fn list_objects(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn info(&self, _: &Endpoint) -> Result<String> {
            Ok(String::new())
        }
        async fn list_tests(&self, _: &Endpoint) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn run(&self, _: &Endpoint, _: &[String]) -> Result<RunOutput> {
            Ok(RunOutput::default())
        }
        async fn report(&self, endpoint: &Endpoint) -> Result<Vec<u8>> {
            assert_eq!(endpoint.object, "network");
            match &self.0 {
                Ok(bytes) => Ok(bytes.clone()),
                Err(_) => Err(Error::ServiceUnavailable),
            }
        }
        async fn owner(&self) -> Result<Option<String>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_report_uses_tool_coordinates() {
        let view = network_view();
        let report = view.report(&ReportService(Ok(b"tarball".to_vec()))).await;
        assert_eq!(report, b"tarball");
    }

    #[tokio::test]
    async fn test_report_failure_is_empty() {
        let view = network_view();
        let report = view.report(&ReportService(Err(Error::ServiceUnavailable))).await;
        assert!(report.is_empty());
    }
}
