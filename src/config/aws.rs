use crate::domain::model::{Environment, SubnetContext, SubnetGroup, SubnetType, VpcContext, VpcQuery};
use crate::domain::ports::{ContextProvider, Storage};
use crate::utils::error::{Result, SynthError};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_cloudformation::Client as CloudFormationClient;
use aws_sdk_ec2::types::Filter;
use aws_sdk_ec2::Client as Ec2Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::collections::BTreeMap;
use tokio::sync::OnceCell;

const SUBNET_TYPE_TAG: &str = "aws-cdk:subnet-type";
const SUBNET_NAME_TAG: &str = "aws-cdk:subnet-name";

pub async fn load_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

fn provider_error(operation: &str, error: impl std::error::Error) -> SynthError {
    SynthError::ProviderError {
        message: format!(
            "{} failed: {}",
            operation,
            aws_sdk_ec2::error::DisplayErrorContext(error)
        ),
    }
}

/// Live lookups against EC2 and CloudFormation.
///
/// Exports are listed once per provider and answered from memory after that.
#[derive(Debug, Clone)]
pub struct AwsContextProvider {
    ec2: Ec2Client,
    cloudformation: CloudFormationClient,
    exports: OnceCell<BTreeMap<String, String>>,
}

impl AwsContextProvider {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            ec2: Ec2Client::new(config),
            cloudformation: CloudFormationClient::new(config),
            exports: OnceCell::new(),
        }
    }

    async fn list_exports(&self) -> Result<BTreeMap<String, String>> {
        let mut exports = BTreeMap::new();
        let mut next_token: Option<String> = None;

        loop {
            let resp = self
                .cloudformation
                .list_exports()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| provider_error("ListExports", e))?;

            for export in resp.exports() {
                if let (Some(name), Some(value)) = (export.name(), export.value()) {
                    exports.insert(name.to_string(), value.to_string());
                }
            }

            match resp.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        tracing::debug!("Listed {} CloudFormation exports", exports.len());
        Ok(exports)
    }

    async fn discover_subnets(&self, vpc_id: &str) -> Result<Vec<DiscoveredSubnet>> {
        let vpc_filter = || Filter::builder().name("vpc-id").values(vpc_id).build();

        let route_tables = self
            .ec2
            .describe_route_tables()
            .filters(vpc_filter())
            .send()
            .await
            .map_err(|e| provider_error("DescribeRouteTables", e))?;

        let mut main_route_table = None;
        let mut associations = BTreeMap::new();
        for table in route_tables.route_tables() {
            let Some(table_id) = table.route_table_id() else {
                continue;
            };
            for association in table.associations() {
                if association.main().unwrap_or(false) {
                    main_route_table = Some(table_id.to_string());
                }
                if let Some(subnet_id) = association.subnet_id() {
                    associations.insert(subnet_id.to_string(), table_id.to_string());
                }
            }
        }

        let subnets = self
            .ec2
            .describe_subnets()
            .filters(vpc_filter())
            .send()
            .await
            .map_err(|e| provider_error("DescribeSubnets", e))?;

        let mut discovered = Vec::new();
        for subnet in subnets.subnets() {
            let Some(subnet_id) = subnet.subnet_id() else {
                continue;
            };
            let tag = |key: &str| {
                subnet
                    .tags()
                    .iter()
                    .find(|t| t.key() == Some(key))
                    .and_then(|t| t.value())
                    .map(str::to_string)
            };

            discovered.push(DiscoveredSubnet {
                subnet_id: subnet_id.to_string(),
                cidr: subnet.cidr_block().unwrap_or_default().to_string(),
                availability_zone: subnet.availability_zone().unwrap_or_default().to_string(),
                route_table_id: associations
                    .get(subnet_id)
                    .cloned()
                    .or_else(|| main_route_table.clone())
                    .unwrap_or_default(),
                type_tag: tag(SUBNET_TYPE_TAG),
                name_tag: tag(SUBNET_NAME_TAG),
                map_public_ip_on_launch: subnet.map_public_ip_on_launch().unwrap_or(false),
            });
        }
        Ok(discovered)
    }
}

#[async_trait]
impl ContextProvider for AwsContextProvider {
    async fn vpc(&self, query: &VpcQuery) -> Result<Option<VpcContext>> {
        let resp = self
            .ec2
            .describe_vpcs()
            .filters(
                Filter::builder()
                    .name("tag:Name")
                    .values(query.vpc_name.clone())
                    .build(),
            )
            .send()
            .await
            .map_err(|e| provider_error("DescribeVpcs", e))?;

        let vpc = match resp.vpcs() {
            [] => return Ok(None),
            [vpc] => vpc,
            many => {
                return Err(SynthError::ContextLookupError {
                    key: query.context_key(),
                    message: format!("{} VPCs are named '{}', expected one", many.len(), query.vpc_name),
                })
            }
        };

        let vpc_id = vpc.vpc_id().unwrap_or_default().to_string();
        let subnets = self.discover_subnets(&vpc_id).await?;
        tracing::info!("🌐 Found {} with {} subnets", vpc_id, subnets.len());

        Ok(Some(VpcContext {
            vpc_id,
            vpc_cidr_block: vpc.cidr_block().unwrap_or_default().to_string(),
            availability_zones: availability_zones(&subnets),
            subnet_groups: group_subnets(subnets),
        }))
    }

    async fn export(&self, _environment: &Environment, name: &str) -> Result<Option<String>> {
        let exports = self
            .exports
            .get_or_try_init(|| self.list_exports())
            .await?;
        Ok(exports.get(name).cloned())
    }
}

/// One subnet as described by EC2, before grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DiscoveredSubnet {
    subnet_id: String,
    cidr: String,
    availability_zone: String,
    route_table_id: String,
    type_tag: Option<String>,
    name_tag: Option<String>,
    map_public_ip_on_launch: bool,
}

impl DiscoveredSubnet {
    fn subnet_type(&self) -> SubnetType {
        match self.type_tag.as_deref() {
            Some("Public") => SubnetType::Public,
            Some("Isolated") => SubnetType::Isolated,
            Some("Private") => SubnetType::Private,
            _ if self.map_public_ip_on_launch => SubnetType::Public,
            _ => SubnetType::Private,
        }
    }

    fn group_name(&self) -> String {
        self.name_tag
            .clone()
            .unwrap_or_else(|| format!("{:?}", self.subnet_type()))
    }
}

fn availability_zones(subnets: &[DiscoveredSubnet]) -> Vec<String> {
    let mut zones: Vec<String> = subnets.iter().map(|s| s.availability_zone.clone()).collect();
    zones.sort();
    zones.dedup();
    zones
}

/// 依名稱分組；組內依可用區與 subnet id 排序，讓快取內容穩定
fn group_subnets(subnets: Vec<DiscoveredSubnet>) -> Vec<SubnetGroup> {
    let mut groups: BTreeMap<String, SubnetGroup> = BTreeMap::new();

    for subnet in subnets {
        let group = groups.entry(subnet.group_name()).or_insert_with(|| SubnetGroup {
            name: subnet.group_name(),
            subnet_type: subnet.subnet_type(),
            subnets: Vec::new(),
        });
        group.subnets.push(SubnetContext {
            subnet_id: subnet.subnet_id,
            cidr: subnet.cidr,
            availability_zone: subnet.availability_zone,
            route_table_id: subnet.route_table_id,
        });
    }

    groups
        .into_values()
        .map(|mut group| {
            group.subnets.sort_by(|a, b| {
                (&a.availability_zone, &a.subnet_id).cmp(&(&b.availability_zone, &b.subnet_id))
            });
            group
        })
        .collect()
}

/// Publishes files under `prefix` in an S3 bucket.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: S3Client,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    fn key(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }
}

impl Storage for S3Storage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key(path))
            .send()
            .await
            .map_err(|e| provider_error("GetObject", e))?;

        let data = resp.body.collect().await.map_err(|e| SynthError::ProviderError {
            message: format!("Failed to collect S3 data: {}", e),
        })?;

        Ok(data.into_bytes().to_vec())
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let key = self.key(path);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| provider_error("PutObject", e))?;

        tracing::debug!("Uploaded s3://{}/{}", self.bucket, key);
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.key(path))
            .send()
            .await
            .map_err(|e| provider_error("DeleteObject", e))?;
        Ok(())
    }

    fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key(""))
    }
}
