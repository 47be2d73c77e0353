//! Load-balanced EC2 service: application load balancer, listener, target
//! group, task definition with roles and log group, and the ECS service.

use crate::core::logical_id::logical_id;
use crate::core::lookup::BasePlatform;
use crate::core::template::{intrinsic, CfnResource, Stack};
use crate::domain::model::{SubnetType, WorkloadSpec};
use crate::utils::error::{Result, SynthError};
use serde_json::{json, Value};

/// Bridge networking maps container ports onto this host range.
pub const EPHEMERAL_PORT_RANGE: (u16, u16) = (32768, 65535);

const ECS_TASKS_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";
const POLICY_VERSION: &str = "2012-10-17";

/// Logical ids of everything declared for one service.
#[derive(Debug, Clone)]
pub struct LoadBalancedEc2Service {
    pub(crate) scope: String,
    pub load_balancer_id: String,
    pub load_balancer_security_group_id: String,
    pub listener_id: String,
    pub target_group_id: String,
    pub task_definition_id: String,
    pub task_role_id: String,
    pub execution_role_id: String,
    pub log_group_id: String,
    pub service_id: String,
}

impl LoadBalancedEc2Service {
    pub fn declare(stack: &mut Stack, platform: &BasePlatform, workload: &WorkloadSpec) -> Result<Self> {
        let scope = workload.construct_id.clone();
        tracing::info!(
            "🧱 Declaring service '{}' ({} x {})",
            workload.service_name,
            workload.desired_count,
            workload.image
        );

        let service = Self {
            load_balancer_id: logical_id(&format!("{}/LB/Resource", scope)),
            load_balancer_security_group_id: logical_id(&format!("{}/LB/SecurityGroup/Resource", scope)),
            listener_id: logical_id(&format!("{}/LB/PublicListener/Resource", scope)),
            target_group_id: logical_id(&format!("{}/LB/PublicListener/ECSGroup/Resource", scope)),
            task_definition_id: logical_id(&format!("{}/TaskDef/Resource", scope)),
            task_role_id: logical_id(&format!("{}/TaskDef/TaskRole/Resource", scope)),
            execution_role_id: logical_id(&format!("{}/TaskDef/ExecutionRole/Resource", scope)),
            log_group_id: logical_id(&format!(
                "{}/TaskDef/{}/LogGroup/Resource",
                scope, workload.container_name
            )),
            service_id: logical_id(&format!("{}/Service/Service", scope)),
            scope,
        };

        service.declare_load_balancer(stack, platform, workload)?;
        service.declare_task_definition(stack, workload)?;
        service.declare_ecs_service(stack, platform, workload)?;
        service.declare_outputs(stack);

        Ok(service)
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Scope under which the `AWS::ECS::Service` resource is declared.
    pub fn service_scope(&self) -> String {
        format!("{}/Service", self.scope)
    }

    pub fn task_role_scope(&self) -> String {
        format!("{}/TaskDef/TaskRole", self.scope)
    }

    fn declare_load_balancer(
        &self,
        stack: &mut Stack,
        platform: &BasePlatform,
        workload: &WorkloadSpec,
    ) -> Result<()> {
        let vpc = platform.vpc();
        let subnets = if workload.public_load_balancer {
            vpc.subnets(SubnetType::Public)
        } else {
            let private = vpc.subnets(SubnetType::Private);
            if private.is_empty() {
                vpc.subnets(SubnetType::Isolated)
            } else {
                private
            }
        };
        if subnets.is_empty() {
            return Err(SynthError::ConstructError {
                path: format!("{}/LB", self.scope),
                message: format!(
                    "VPC '{}' has no {} subnets for the load balancer",
                    vpc.name(),
                    if workload.public_load_balancer { "public" } else { "private" }
                ),
            });
        }

        let sg_group_id = intrinsic::get_att(&self.load_balancer_security_group_id, "GroupId");
        let listener_port = workload.listener_port;

        let mut security_group = json!({
            "GroupDescription": format!(
                "Automatically created Security Group for ELB {}{}",
                stack.name(),
                self.scope
            ),
            "SecurityGroupEgress": [{
                "CidrIp": "255.255.255.255/32",
                "Description": "Disallow all traffic",
                "FromPort": 252,
                "IpProtocol": "icmp",
                "ToPort": 86,
            }],
            "VpcId": vpc.vpc_id(),
        });
        // 只有對外的負載平衡器才開放給所有來源
        if workload.public_load_balancer {
            security_group["SecurityGroupIngress"] = json!([{
                "CidrIp": "0.0.0.0/0",
                "Description": format!("Allow from anyone on port {}", listener_port),
                "FromPort": listener_port,
                "IpProtocol": "tcp",
                "ToPort": listener_port,
            }]);
        }
        stack.add_resource(CfnResource::new(
            format!("{}/LB/SecurityGroup/Resource", self.scope),
            "AWS::EC2::SecurityGroup",
            security_group,
        ))?;

        let (from_port, to_port) = EPHEMERAL_PORT_RANGE;
        for group in platform.cluster().security_groups() {
            let port_range = format!("{}:{}-{}", group.construct_id(), from_port, to_port);

            stack.add_resource(CfnResource::new(
                format!("{}/LB/SecurityGroup/to {}", self.scope, port_range),
                "AWS::EC2::SecurityGroupEgress",
                json!({
                    "GroupId": sg_group_id,
                    "IpProtocol": "tcp",
                    "Description": "Load balancer to target",
                    "DestinationSecurityGroupId": group.group_id().to_token(),
                    "FromPort": from_port,
                    "ToPort": to_port,
                }),
            ))?;

            stack.add_resource(CfnResource::new(
                format!(
                    "{}/from {}LBSecurityGroup:{}-{}",
                    group.construct_id(),
                    self.scope,
                    from_port,
                    to_port
                ),
                "AWS::EC2::SecurityGroupIngress",
                json!({
                    "IpProtocol": "tcp",
                    "Description": "Load balancer to target",
                    "FromPort": from_port,
                    "GroupId": group.group_id().to_token(),
                    "SourceSecurityGroupId": sg_group_id,
                    "ToPort": to_port,
                }),
            ))?;
        }

        let subnet_ids: Vec<Value> = subnets.iter().map(|s| json!(s.subnet_id)).collect();
        let scheme = if workload.public_load_balancer {
            "internet-facing"
        } else {
            "internal"
        };
        stack.add_resource(CfnResource::new(
            format!("{}/LB/Resource", self.scope),
            "AWS::ElasticLoadBalancingV2::LoadBalancer",
            json!({
                "LoadBalancerAttributes": [{
                    "Key": "deletion_protection.enabled",
                    "Value": "false",
                }],
                "Scheme": scheme,
                "SecurityGroups": [sg_group_id],
                "Subnets": subnet_ids,
                "Type": "application",
            }),
        ))?;

        stack.add_resource(CfnResource::new(
            format!("{}/LB/PublicListener/ECSGroup/Resource", self.scope),
            "AWS::ElasticLoadBalancingV2::TargetGroup",
            json!({
                "Port": 80,
                "Protocol": "HTTP",
                "TargetType": "instance",
                "VpcId": vpc.vpc_id(),
            }),
        ))?;

        stack.add_resource(CfnResource::new(
            format!("{}/LB/PublicListener/Resource", self.scope),
            "AWS::ElasticLoadBalancingV2::Listener",
            json!({
                "DefaultActions": [{
                    "TargetGroupArn": intrinsic::reference(&self.target_group_id),
                    "Type": "forward",
                }],
                "LoadBalancerArn": intrinsic::reference(&self.load_balancer_id),
                "Port": listener_port,
                "Protocol": "HTTP",
            }),
        ))?;

        Ok(())
    }

    fn declare_task_definition(&self, stack: &mut Stack, workload: &WorkloadSpec) -> Result<()> {
        for role in ["TaskRole", "ExecutionRole"] {
            stack.add_resource(CfnResource::new(
                format!("{}/TaskDef/{}/Resource", self.scope, role),
                "AWS::IAM::Role",
                json!({
                    "AssumeRolePolicyDocument": {
                        "Statement": [{
                            "Action": "sts:AssumeRole",
                            "Effect": "Allow",
                            "Principal": { "Service": ECS_TASKS_PRINCIPAL },
                        }],
                        "Version": POLICY_VERSION,
                    },
                }),
            ))?;
        }

        let mut log_group = CfnResource::new(
            format!("{}/TaskDef/{}/LogGroup/Resource", self.scope, workload.container_name),
            "AWS::Logs::LogGroup",
            json!({}),
        );
        log_group.retain();
        stack.add_resource(log_group)?;

        let execution_policy_path = format!("{}/TaskDef/ExecutionRole/DefaultPolicy/Resource", self.scope);
        let execution_policy_id = logical_id(&execution_policy_path);
        stack.add_resource(CfnResource::new(
            execution_policy_path,
            "AWS::IAM::Policy",
            json!({
                "PolicyDocument": {
                    "Statement": [{
                        "Action": ["logs:CreateLogStream", "logs:PutLogEvents"],
                        "Effect": "Allow",
                        "Resource": intrinsic::get_att(&self.log_group_id, "Arn"),
                    }],
                    "Version": POLICY_VERSION,
                },
                "PolicyName": execution_policy_id,
                "Roles": [intrinsic::reference(&self.execution_role_id)],
            }),
        ))?;

        // 環境變數依名稱排序，確保輸出穩定
        let environment: Vec<Value> = workload
            .environment
            .iter()
            .map(|(name, value)| json!({ "Name": name, "Value": value }))
            .collect();

        let mut container = json!({
            "Cpu": workload.cpu,
            "Essential": true,
            "Image": workload.image,
            "LogConfiguration": {
                "LogDriver": "awslogs",
                "Options": {
                    "awslogs-group": intrinsic::reference(&self.log_group_id),
                    "awslogs-stream-prefix": self.scope,
                    "awslogs-region": stack.environment().region,
                },
            },
            "Memory": workload.memory_limit_mib,
            "Name": workload.container_name,
            "PortMappings": [{
                "ContainerPort": workload.container_port,
                "HostPort": 0,
                "Protocol": "tcp",
            }],
        });
        if !environment.is_empty() {
            container["Environment"] = Value::Array(environment);
        }

        let family: String = format!("{}{}", stack.name(), self.task_definition_id)
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();

        let mut task_definition = CfnResource::new(
            format!("{}/TaskDef/Resource", self.scope),
            "AWS::ECS::TaskDefinition",
            json!({
                "ContainerDefinitions": [container],
                "ExecutionRoleArn": intrinsic::get_att(&self.execution_role_id, "Arn"),
                "Family": family,
                "NetworkMode": "bridge",
                "RequiresCompatibilities": ["EC2"],
                "TaskRoleArn": intrinsic::get_att(&self.task_role_id, "Arn"),
            }),
        );
        task_definition.add_dependency(execution_policy_id);
        stack.add_resource(task_definition)?;

        Ok(())
    }

    fn declare_ecs_service(
        &self,
        stack: &mut Stack,
        platform: &BasePlatform,
        workload: &WorkloadSpec,
    ) -> Result<()> {
        let mut service = CfnResource::new(
            format!("{}/Service", self.service_scope()),
            "AWS::ECS::Service",
            json!({
                "Cluster": platform.cluster().cluster_name().to_token(),
                "DeploymentConfiguration": {
                    "MaximumPercent": 200,
                    "MinimumHealthyPercent": 50,
                },
                "DesiredCount": workload.desired_count,
                "EnableECSManagedTags": false,
                "HealthCheckGracePeriodSeconds": 60,
                "LaunchType": "EC2",
                "LoadBalancers": [{
                    "ContainerName": workload.container_name,
                    "ContainerPort": workload.container_port,
                    "TargetGroupArn": intrinsic::reference(&self.target_group_id),
                }],
                "SchedulingStrategy": "REPLICA",
                "ServiceName": workload.service_name,
                "TaskDefinition": intrinsic::reference(&self.task_definition_id),
            }),
        );
        // 目標群組必須先掛上 listener，服務才能註冊
        service.add_dependency(self.listener_id.clone());
        service.add_dependency(self.target_group_id.clone());
        stack.add_resource(service)?;
        Ok(())
    }

    fn declare_outputs(&self, stack: &mut Stack) {
        let dns_name = intrinsic::get_att(&self.load_balancer_id, "DNSName");
        stack.add_output(
            logical_id(&format!("{}/LoadBalancerDNS", self.scope)),
            dns_name.clone(),
            None,
        );
        stack.add_output(
            logical_id(&format!("{}/ServiceURL", self.scope)),
            intrinsic::join("", vec![json!("http://"), dns_name]),
            None,
        );
    }
}
