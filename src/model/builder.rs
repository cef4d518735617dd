//! Builds the task tree from the tools a strategy enumerates

use std::collections::HashSet;
use std::sync::Arc;

use crate::common::{config::ServiceConfig, Result};
use crate::descriptor::{build_executables, Locale, Sections};
use crate::service::{Endpoint, LocalCatalog, RemoteService};

use super::task::{Invocation, Task};
use super::tree::Tree;

/// Where tools and their tests come from
#[derive(Clone)]
pub enum BuildStrategy {
    /// Everything through the management service; tests run remotely
    Remote {
        service: Arc<dyn RemoteService>,
        coordinates: ServiceConfig,
    },
    /// Descriptor files on disk; tests run as local subprocesses
    Local {
        catalog: Arc<LocalCatalog>,
        coordinates: ServiceConfig,
    },
}

impl BuildStrategy {
    /// The service answering `Info`, `List`, `Run` and `Report`
    pub fn service(&self) -> Arc<dyn RemoteService> {
        match self {
            Self::Remote { service, .. } => Arc::clone(service),
            Self::Local { catalog, .. } => Arc::clone(catalog) as Arc<dyn RemoteService>,
        }
    }

    fn coordinates(&self) -> &ServiceConfig {
        match self {
            Self::Remote { coordinates, .. } | Self::Local { coordinates, .. } => coordinates,
        }
    }

    fn invocation(&self, object: &str) -> Invocation {
        let endpoint = Endpoint::for_object(self.coordinates(), object);
        match self {
            Self::Remote { .. } => Invocation::remote(endpoint),
            Self::Local { catalog, .. } => match catalog.executable(object) {
                Some(executable) => Invocation::local(endpoint, executable),
                None => Invocation::remote(endpoint),
            },
        }
    }
}

pub struct ModelBuilder {
    strategy: BuildStrategy,
    locale: Locale,
}

impl ModelBuilder {
    pub fn new(strategy: BuildStrategy, locale: Locale) -> Self {
        Self { strategy, locale }
    }

    pub fn strategy(&self) -> &BuildStrategy {
        &self.strategy
    }

    /// Enumerate the tools and assemble the tree
    ///
    /// Only a failed enumeration is an error. A tool whose data can't be
    /// fetched or parsed is left out entirely.
    #[tracing::instrument(skip(self), fields(locale = ?self.locale.tag()))]
    pub async fn build_model(&self) -> Result<Tree> {
        let service = self.strategy.service();
        let objects = service.list_objects().await?;
        tracing::debug!(count = objects.len(), "Enumerated tool objects");

        let mut tree = Tree::new();
        let mut seen = HashSet::new();

        for object in &objects {
            let (tool, tests) = match self.build_tool(service.as_ref(), object).await {
                Ok(built) => built,
                Err(e) => {
                    tracing::warn!(object = %object, error = %e, "Skipping tool");
                    continue;
                }
            };

            if !seen.insert(tool.id.clone()) {
                tracing::warn!(object = %object, tool = %tool.id, "Skipping tool with duplicate id");
                continue;
            }

            tracing::debug!(tool = %tool.id, tests = tests.len(), "Adding tool");
            tree.insert_tool(tool, tests);
        }

        tree.localize(&self.locale);
        Ok(tree)
    }

    async fn build_tool(
        &self,
        service: &dyn RemoteService,
        object: &str,
    ) -> Result<(Task, Vec<Task>)> {
        let invocation = self.strategy.invocation(object);
        let info = service.info(&invocation.endpoint).await?;
        let test_names = service.list_tests(&invocation.endpoint).await?;
        let sections = Sections::parse(&info);
        build_executables(&sections, &test_names, &invocation)
    }
}
