use crate::backup::source::mysqldump::{DatabaseClient, MysqlCli};
use crate::backup::upload::s3::AwsCli;
use crate::backup::upload::ObjectStore;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// External tools the sources and stages talk to.
#[derive(Clone)]
pub struct Collaborators {
    pub database: Arc<dyn DatabaseClient>,
    pub object_store: Arc<dyn ObjectStore>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            database: Arc::new(MysqlCli::default()),
            object_store: Arc::new(AwsCli::default()),
        }
    }
}

impl Debug for Collaborators {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// State shared by every task of one run.
#[derive(Clone, Debug)]
pub struct RunContext {
    /// Stamp put into every artifact name, `%Y%m%d_%H%M`
    pub timestamp: String,
    pub collaborators: Collaborators,
}
