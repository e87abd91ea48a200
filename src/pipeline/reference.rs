use crate::config::AttributeConfig;
use crate::constants;
use crate::control_plane::{Reader, ResourceObject};
use crate::error::{ExporterError, Result};
use std::collections::HashMap;
use tracing::{error, warn};

/// Benchmark rating attached to a host or, as fallback, its cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Benchmark {
    pub kind: String,
    pub value: String,
}

/// Read-only lookup tables built once per run, before any record
/// transformation starts. A missing key yields an absent field downstream,
/// never an error.
#[derive(Debug, Default)]
pub struct ReferenceTables {
    identity_by_user: HashMap<i64, String>,
    image_uri_by_image: HashMap<i64, String>,
    benchmark_by_host: HashMap<i64, Benchmark>,
}

impl ReferenceTables {
    pub fn new(
        identity_by_user: HashMap<i64, String>,
        image_uri_by_image: HashMap<i64, String>,
        benchmark_by_host: HashMap<i64, Benchmark>,
    ) -> Self {
        Self {
            identity_by_user,
            image_uri_by_image,
            benchmark_by_host,
        }
    }

    /// Display identity for a user; empty identities count as unknown.
    pub fn identity(&self, user_id: i64) -> Option<&str> {
        self.identity_by_user
            .get(&user_id)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Provenance URI for an image; empty URIs count as unknown.
    pub fn image_uri(&self, image_id: i64) -> Option<&str> {
        self.image_uri_by_image
            .get(&image_id)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn benchmark(&self, host_id: i64) -> Option<&Benchmark> {
        self.benchmark_by_host.get(&host_id)
    }
}

/// Builds the reference tables by querying the Reader once per collection.
///
/// The three sub-resolutions run concurrently and all complete before the
/// tables are handed out. Individual entity failures are logged and skipped;
/// only a failure to list the cluster collection is fatal, since every host
/// benchmark fallback depends on it.
pub struct ReferenceResolver<'a> {
    reader: &'a dyn Reader,
    attributes: &'a AttributeConfig,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(reader: &'a dyn Reader, attributes: &'a AttributeConfig) -> Self {
        Self { reader, attributes }
    }

    pub async fn build(&self) -> Result<ReferenceTables> {
        let (identities, image_uris, benchmarks) = tokio::join!(
            self.build_identities(),
            self.build_image_uris(),
            self.build_benchmarks(),
        );

        Ok(ReferenceTables::new(identities, image_uris, benchmarks?))
    }

    async fn build_identities(&self) -> HashMap<i64, String> {
        let users = match self.reader.list_all_users().await {
            Ok(users) => users,
            Err(e) => {
                error!(error = %e, "error list all users");
                return HashMap::new();
            }
        };

        attribute_table(&users, &self.attributes.identity, "user")
    }

    async fn build_image_uris(&self) -> HashMap<i64, String> {
        let images = match self.reader.list_all_images().await {
            Ok(images) => images,
            Err(e) => {
                error!(error = %e, "error list all images");
                return HashMap::new();
            }
        };

        attribute_table(&images, &self.attributes.image_uri, "image")
    }

    async fn build_benchmarks(&self) -> Result<HashMap<i64, Benchmark>> {
        // No clusters means no way to compute host fallbacks; fatal for the run.
        let clusters = self
            .reader
            .list_all_clusters()
            .await
            .map_err(|e| ExporterError::ControlPlane(format!("error list all clusters: {e}")))?;
        let cluster_benchmarks = cluster_table(&clusters);

        let hosts = match self.reader.list_all_hosts().await {
            Ok(hosts) => hosts,
            Err(e) => {
                error!(error = %e, "error list all hosts");
                return Ok(HashMap::new());
            }
        };

        let mut table = HashMap::with_capacity(hosts.len());
        for host in &hosts {
            let Some(id) = host.id() else {
                error!("error get host ID");
                continue;
            };

            let kind = host
                .attribute(constants::TEMPLATE_BENCHMARK_TYPE)
                .unwrap_or_else(|| from_cluster(host, &cluster_benchmarks, |b| &b.kind));
            let value = host
                .attribute(constants::TEMPLATE_BENCHMARK_VALUE)
                .unwrap_or_else(|| from_cluster(host, &cluster_benchmarks, |b| &b.value));

            table.insert(id, Benchmark { kind, value });
        }

        Ok(table)
    }
}

/// Resolves one attribute per entity, falling back to the stringified
/// numeric ID when the attribute is absent.
fn attribute_table(
    entities: &[ResourceObject],
    attribute: &str,
    entity_kind: &str,
) -> HashMap<i64, String> {
    let mut table = HashMap::with_capacity(entities.len());
    for entity in entities {
        let Some(id) = entity.id() else {
            error!(entity = entity_kind, "error get entity ID");
            continue;
        };
        let value = entity.attribute(attribute).unwrap_or_else(|| id.to_string());
        table.insert(id, value);
    }
    table
}

fn cluster_table(clusters: &[ResourceObject]) -> HashMap<i64, Benchmark> {
    let mut table = HashMap::with_capacity(clusters.len());
    for cluster in clusters {
        let Some(id) = cluster.id() else {
            error!("error get cluster ID");
            continue;
        };

        let kind = cluster
            .attribute(constants::TEMPLATE_BENCHMARK_TYPE)
            .unwrap_or_else(|| {
                warn!(cluster = id, "couldn't get benchmark type from cluster");
                String::new()
            });
        let value = cluster
            .attribute(constants::TEMPLATE_BENCHMARK_VALUE)
            .unwrap_or_else(|| {
                warn!(cluster = id, "couldn't get benchmark value from cluster");
                String::new()
            });

        table.insert(id, Benchmark { kind, value });
    }
    table
}

fn from_cluster(
    host: &ResourceObject,
    clusters: &HashMap<i64, Benchmark>,
    field: impl Fn(&Benchmark) -> &String,
) -> String {
    let Some(cluster_id) = host.attribute_i64(constants::CLUSTER_ID) else {
        error!("error get cluster ID from host");
        return String::new();
    };

    clusters
        .get(&cluster_id)
        .map(|b| field(b).clone())
        .unwrap_or_default()
}
