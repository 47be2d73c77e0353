//! Corrections applied on top of the declared service.

use crate::config::PatchConfig;
use crate::core::service::LoadBalancedEc2Service;
use crate::core::template::{intrinsic, CfnResource, Stack};
use crate::domain::model::PolicyStatement;
use crate::utils::error::{Result, SynthError};
use serde_json::{json, Value};

pub const LAUNCH_TYPE_PROPERTY: &str = "LaunchType";

/// The generated `AWS::ECS::Service` of `service`.
///
/// Resolved by resource type under the service scope; this is the only place
/// that knows how the service resource is nested.
pub fn service_resource_mut<'a>(
    stack: &'a mut Stack,
    service: &LoadBalancedEc2Service,
) -> Result<&'a mut CfnResource> {
    stack.find_child_mut(&service.service_scope(), "AWS::ECS::Service")
}

/// Drops `LaunchType` so the cluster's default capacity provider strategy
/// decides where tasks run.
pub fn remove_launch_type(stack: &mut Stack, service: &LoadBalancedEc2Service) -> Result<()> {
    let resource = service_resource_mut(stack, service)?;
    resource.add_property_deletion_override(LAUNCH_TYPE_PROPERTY);
    tracing::info!(
        "🩹 Removed {} from {}",
        LAUNCH_TYPE_PROPERTY,
        resource.logical_id()
    );
    Ok(())
}

/// 把權限加到 task role 的預設 policy；policy 不存在時建立
pub fn add_to_task_role_policy(
    stack: &mut Stack,
    service: &LoadBalancedEc2Service,
    statement: PolicyStatement,
) -> Result<String> {
    let scope = format!("{}/DefaultPolicy", service.task_role_scope());

    let existing = stack
        .resources_under(&scope)
        .find(|r| r.resource_type() == "AWS::IAM::Policy")
        .map(|r| r.logical_id().to_string());

    let policy_id = match existing {
        Some(id) => id,
        None => {
            let path = format!("{}/Resource", scope);
            let policy_name = crate::core::logical_id::logical_id(&path);
            let id = stack.add_resource(CfnResource::new(
                path,
                "AWS::IAM::Policy",
                json!({
                    "PolicyDocument": {
                        "Statement": [],
                        "Version": "2012-10-17",
                    },
                    "PolicyName": policy_name,
                    "Roles": [intrinsic::reference(&service.task_role_id)],
                }),
            ))?;

            // Task definition must not start before its role can act.
            stack
                .resource_mut(&service.task_definition_id)
                .ok_or_else(|| SynthError::ConstructError {
                    path: service.scope().to_string(),
                    message: "task definition not declared".to_string(),
                })?
                .add_dependency(id.clone());
            id
        }
    };

    let policy = stack
        .resource_mut(&policy_id)
        .ok_or_else(|| SynthError::ConstructError {
            path: scope.clone(),
            message: "task role policy disappeared".to_string(),
        })?;

    match policy.properties_mut().pointer_mut("/PolicyDocument/Statement") {
        Some(Value::Array(statements)) => statements.push(statement.to_json()),
        _ => {
            return Err(SynthError::ConstructError {
                path: scope,
                message: "policy document has no statement list".to_string(),
            })
        }
    }

    tracing::info!(
        "🔐 Granted {} on {:?} to the task role",
        statement.actions.join(", "),
        statement.resources
    );
    Ok(policy_id)
}

pub fn apply_patches(
    stack: &mut Stack,
    service: &LoadBalancedEc2Service,
    patch: &PatchConfig,
    task_role_statement: PolicyStatement,
) -> Result<()> {
    if patch.remove_launch_type {
        remove_launch_type(stack, service)?;
    }
    add_to_task_role_policy(stack, service, task_role_statement)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Environment;

    /// Minimal stand-in for a declared service: just the resources the
    /// patches touch.
    fn declared() -> (Stack, LoadBalancedEc2Service) {
        let mut stack = Stack::new("test", Environment::new("123456789012", "us-west-2"));
        let scope = "Svc";
        let task_def = stack
            .add_resource(CfnResource::new(
                format!("{}/TaskDef/Resource", scope),
                "AWS::ECS::TaskDefinition",
                json!({ "Family": "f" }),
            ))
            .unwrap();
        let task_role = stack
            .add_resource(CfnResource::new(
                format!("{}/TaskDef/TaskRole/Resource", scope),
                "AWS::IAM::Role",
                json!({}),
            ))
            .unwrap();
        let service_id = stack
            .add_resource(CfnResource::new(
                format!("{}/Service/Service", scope),
                "AWS::ECS::Service",
                json!({ "LaunchType": "EC2", "DesiredCount": 3 }),
            ))
            .unwrap();

        let service = LoadBalancedEc2Service {
            scope: scope.to_string(),
            load_balancer_id: String::new(),
            load_balancer_security_group_id: String::new(),
            listener_id: String::new(),
            target_group_id: String::new(),
            task_definition_id: task_def,
            task_role_id: task_role,
            execution_role_id: String::new(),
            log_group_id: String::new(),
            service_id,
        };
        (stack, service)
    }

    fn introspection() -> PolicyStatement {
        PolicyStatement::allow(
            vec!["ecs:ListTasks".to_string(), "ecs:DescribeTasks".to_string()],
            vec![json!("*")],
        )
    }

    #[test]
    fn test_remove_launch_type() {
        let (mut stack, service) = declared();
        remove_launch_type(&mut stack, &service).unwrap();

        let rendered = stack.resource(&service.service_id).unwrap().render();
        assert!(rendered["Properties"].get("LaunchType").is_none());
        assert_eq!(rendered["Properties"]["DesiredCount"], 3);
    }

    #[test]
    fn test_accessor_fails_when_service_missing() {
        let (mut stack, mut service) = declared();
        service.scope = "Other".to_string();
        assert!(matches!(
            remove_launch_type(&mut stack, &service),
            Err(SynthError::ConstructError { .. })
        ));
    }

    #[test]
    fn test_task_role_policy_is_created_once() {
        let (mut stack, service) = declared();

        let first = add_to_task_role_policy(&mut stack, &service, introspection()).unwrap();
        let second = add_to_task_role_policy(
            &mut stack,
            &service,
            PolicyStatement::allow(vec!["ecs:DescribeServices".to_string()], vec![json!("*")]),
        )
        .unwrap();
        assert_eq!(first, second);

        let policy = stack.resource(&first).unwrap().render();
        let statements = policy["Properties"]["PolicyDocument"]["Statement"].as_array().unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0]["Action"], json!(["ecs:ListTasks", "ecs:DescribeTasks"]));
        assert_eq!(statements[0]["Resource"], "*");
        assert_eq!(policy["Properties"]["Roles"][0]["Ref"], json!(service.task_role_id));

        let task_def = stack.resource(&service.task_definition_id).unwrap().render();
        assert_eq!(task_def["DependsOn"], json!([first]));
    }

    #[test]
    fn test_apply_patches_respects_config() {
        let (mut stack, service) = declared();
        let keep = PatchConfig {
            remove_launch_type: false,
        };
        apply_patches(&mut stack, &service, &keep, introspection()).unwrap();

        let rendered = stack.resource(&service.service_id).unwrap().render();
        assert_eq!(rendered["Properties"]["LaunchType"], "EC2");
        assert_eq!(stack.resources_of_type("AWS::IAM::Policy").count(), 1);
    }
}
