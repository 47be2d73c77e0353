use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Deployment target: one account in one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub account: String,
    pub region: String,
}

impl Environment {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }

    pub fn uri(&self) -> String {
        format!("aws://{}/{}", self.account, self.region)
    }
}

/// A value published by another stack and consumed through `Fn::ImportValue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedValue {
    export_name: String,
    resolved: String,
}

impl ImportedValue {
    pub(crate) fn new(export_name: impl Into<String>, resolved: impl Into<String>) -> Self {
        Self {
            export_name: export_name.into(),
            resolved: resolved.into(),
        }
    }

    pub fn export_name(&self) -> &str {
        &self.export_name
    }

    /// 綜合時查到的值，只用於診斷訊息
    pub fn resolved(&self) -> &str {
        &self.resolved
    }

    pub fn to_token(&self) -> Value {
        json!({ "Fn::ImportValue": self.export_name })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubnetType {
    Public,
    Private,
    Isolated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetContext {
    pub subnet_id: String,
    pub cidr: String,
    pub availability_zone: String,
    pub route_table_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetGroup {
    pub name: String,
    #[serde(rename = "type")]
    pub subnet_type: SubnetType,
    pub subnets: Vec<SubnetContext>,
}

/// Cached answer of a VPC lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcContext {
    pub vpc_id: String,
    pub vpc_cidr_block: String,
    pub availability_zones: Vec<String>,
    pub subnet_groups: Vec<SubnetGroup>,
}

/// What to ask a context provider for when resolving a VPC by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcQuery {
    pub environment: Environment,
    pub vpc_name: String,
}

impl VpcQuery {
    pub fn context_key(&self) -> String {
        format!(
            "vpc-provider:account={}:filter.tag:Name={}:region={}:returnAsymmetricSubnets=true",
            self.environment.account, self.vpc_name, self.environment.region
        )
    }
}

#[derive(Debug, Clone)]
pub struct VpcHandle {
    name: String,
    context: VpcContext,
}

impl VpcHandle {
    pub(crate) fn new(name: impl Into<String>, context: VpcContext) -> Self {
        Self {
            name: name.into(),
            context,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vpc_id(&self) -> &str {
        &self.context.vpc_id
    }

    pub fn cidr_block(&self) -> &str {
        &self.context.vpc_cidr_block
    }

    pub fn availability_zones(&self) -> &[String] {
        &self.context.availability_zones
    }

    pub fn subnets(&self, subnet_type: SubnetType) -> Vec<&SubnetContext> {
        self.context
            .subnet_groups
            .iter()
            .filter(|group| group.subnet_type == subnet_type)
            .flat_map(|group| group.subnets.iter())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct NamespaceHandle {
    name: ImportedValue,
    arn: ImportedValue,
    id: ImportedValue,
}

impl NamespaceHandle {
    pub(crate) fn new(name: ImportedValue, arn: ImportedValue, id: ImportedValue) -> Self {
        Self { name, arn, id }
    }

    pub fn name(&self) -> &ImportedValue {
        &self.name
    }

    pub fn arn(&self) -> &ImportedValue {
        &self.arn
    }

    pub fn id(&self) -> &ImportedValue {
        &self.id
    }
}

/// Security group attached to the cluster's container instances.
#[derive(Debug, Clone)]
pub struct SecurityGroupRef {
    construct_id: String,
    group_id: ImportedValue,
}

impl SecurityGroupRef {
    pub(crate) fn new(construct_id: impl Into<String>, group_id: ImportedValue) -> Self {
        Self {
            construct_id: construct_id.into(),
            group_id,
        }
    }

    pub fn construct_id(&self) -> &str {
        &self.construct_id
    }

    pub fn group_id(&self) -> &ImportedValue {
        &self.group_id
    }
}

#[derive(Debug, Clone)]
pub struct ClusterHandle {
    cluster_name: ImportedValue,
    security_groups: Vec<SecurityGroupRef>,
    vpc: VpcHandle,
    default_namespace: NamespaceHandle,
}

impl ClusterHandle {
    pub(crate) fn new(
        cluster_name: ImportedValue,
        security_groups: Vec<SecurityGroupRef>,
        vpc: VpcHandle,
        default_namespace: NamespaceHandle,
    ) -> Self {
        Self {
            cluster_name,
            security_groups,
            vpc,
            default_namespace,
        }
    }

    pub fn cluster_name(&self) -> &ImportedValue {
        &self.cluster_name
    }

    pub fn security_groups(&self) -> &[SecurityGroupRef] {
        &self.security_groups
    }

    pub fn vpc(&self) -> &VpcHandle {
        &self.vpc
    }

    pub fn default_namespace(&self) -> &NamespaceHandle {
        &self.default_namespace
    }
}

/// Desired state of the load-balanced container workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    pub construct_id: String,
    pub service_name: String,
    pub image: String,
    pub container_name: String,
    pub container_port: u16,
    pub cpu: u32,
    pub memory_limit_mib: u32,
    pub desired_count: u32,
    pub public_load_balancer: bool,
    pub listener_port: u16,
    pub environment: BTreeMap<String, String>,
}

/// An `Allow` statement; nothing here ever denies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStatement {
    pub actions: Vec<String>,
    pub resources: Vec<Value>,
}

impl PolicyStatement {
    pub fn allow(actions: Vec<String>, resources: Vec<Value>) -> Self {
        Self { actions, resources }
    }

    /// IAM 允許單一值不包成陣列，和 CloudFormation 的慣例一致
    pub fn to_json(&self) -> Value {
        let collapse = |mut values: Vec<Value>| {
            if values.len() == 1 {
                values.remove(0)
            } else {
                Value::Array(values)
            }
        };

        json!({
            "Action": collapse(self.actions.iter().cloned().map(Value::String).collect()),
            "Effect": "Allow",
            "Resource": collapse(self.resources.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vpc() -> VpcContext {
        VpcContext {
            vpc_id: "vpc-123".to_string(),
            vpc_cidr_block: "10.0.0.0/16".to_string(),
            availability_zones: vec!["us-west-2a".to_string(), "us-west-2b".to_string()],
            subnet_groups: vec![
                SubnetGroup {
                    name: "Public".to_string(),
                    subnet_type: SubnetType::Public,
                    subnets: vec![SubnetContext {
                        subnet_id: "subnet-pub-a".to_string(),
                        cidr: "10.0.0.0/24".to_string(),
                        availability_zone: "us-west-2a".to_string(),
                        route_table_id: "rtb-1".to_string(),
                    }],
                },
                SubnetGroup {
                    name: "Private".to_string(),
                    subnet_type: SubnetType::Private,
                    subnets: vec![SubnetContext {
                        subnet_id: "subnet-priv-a".to_string(),
                        cidr: "10.0.1.0/24".to_string(),
                        availability_zone: "us-west-2a".to_string(),
                        route_table_id: "rtb-2".to_string(),
                    }],
                },
            ],
        }
    }

    #[test]
    fn test_vpc_query_context_key() {
        let query = VpcQuery {
            environment: Environment::new("123456789012", "us-west-2"),
            vpc_name: "ecsworkshop-base/BaseVPC".to_string(),
        };
        assert_eq!(
            query.context_key(),
            "vpc-provider:account=123456789012:filter.tag:Name=ecsworkshop-base/BaseVPC:region=us-west-2:returnAsymmetricSubnets=true"
        );
    }

    #[test]
    fn test_vpc_handle_subnets_by_type() {
        let vpc = VpcHandle::new("base", sample_vpc());
        let public: Vec<_> = vpc
            .subnets(SubnetType::Public)
            .iter()
            .map(|s| s.subnet_id.as_str())
            .collect();
        assert_eq!(public, vec!["subnet-pub-a"]);
        assert!(vpc.subnets(SubnetType::Isolated).is_empty());
    }

    #[test]
    fn test_vpc_context_uses_camel_case() {
        let json = serde_json::to_value(sample_vpc()).unwrap();
        assert_eq!(json["vpcId"], "vpc-123");
        assert_eq!(json["subnetGroups"][0]["type"], "Public");
        assert_eq!(json["subnetGroups"][0]["subnets"][0]["routeTableId"], "rtb-1");
    }

    #[test]
    fn test_policy_statement_collapses_single_values() {
        let statement = PolicyStatement::allow(
            vec!["ecs:ListTasks".to_string(), "ecs:DescribeTasks".to_string()],
            vec![json!("*")],
        );
        assert_eq!(
            statement.to_json(),
            json!({
                "Action": ["ecs:ListTasks", "ecs:DescribeTasks"],
                "Effect": "Allow",
                "Resource": "*"
            })
        );
    }

    #[test]
    fn test_imported_value_token() {
        let value = ImportedValue::new("ECSClusterName", "container-demo");
        assert_eq!(value.to_token(), json!({"Fn::ImportValue": "ECSClusterName"}));
        assert_eq!(value.resolved(), "container-demo");
    }
}
