use ecs_service_stack::config::toml_config::StackFile;
use ecs_service_stack::domain::model::Environment;
use ecs_service_stack::utils::error::{ErrorCategory, SynthError};
use ecs_service_stack::{ContextFile, LocalStorage, StackConfig, SynthEngine};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

const CONTEXT: &str = r#"{
  "exports-provider:account=123456789012:region=us-west-2": {
    "ECSClusterName": "container-demo",
    "ECSSecGrpList1": "sg-0000000000000001",
    "ECSSecGrpList2": "sg-0000000000000002",
    "ECSSecGrpList3": "sg-0000000000000003",
    "NSARN": "arn:aws:servicediscovery:us-west-2:123456789012:namespace/ns-abc",
    "NSID": "ns-abc",
    "NSNAME": "service.local"
  },
  "vpc-provider:account=123456789012:filter.tag:Name=ecsworkshop-base/BaseVPC:region=us-west-2:returnAsymmetricSubnets=true": {
    "vpcId": "vpc-0abc",
    "vpcCidrBlock": "10.0.0.0/16",
    "availabilityZones": ["us-west-2a", "us-west-2b"],
    "subnetGroups": [
      {
        "name": "Public",
        "type": "Public",
        "subnets": [
          { "subnetId": "subnet-pub-a", "cidr": "10.0.0.0/24", "availabilityZone": "us-west-2a", "routeTableId": "rtb-pub" },
          { "subnetId": "subnet-pub-b", "cidr": "10.0.1.0/24", "availabilityZone": "us-west-2b", "routeTableId": "rtb-pub" }
        ]
      },
      {
        "name": "Private",
        "type": "Private",
        "subnets": [
          { "subnetId": "subnet-priv-a", "cidr": "10.0.2.0/24", "availabilityZone": "us-west-2a", "routeTableId": "rtb-priv-a" },
          { "subnetId": "subnet-priv-b", "cidr": "10.0.3.0/24", "availabilityZone": "us-west-2b", "routeTableId": "rtb-priv-b" }
        ]
      }
    ]
  }
}"#;

fn environment() -> Environment {
    Environment::new("123456789012", "us-west-2")
}

fn context() -> ContextFile {
    ContextFile::from_json_str(CONTEXT).unwrap()
}

fn default_engine() -> SynthEngine<ContextFile> {
    SynthEngine::new(StackConfig::new("ecsworkshop", environment()), context())
}

fn resources_of_type<'a>(template: &'a Value, resource_type: &str) -> Vec<&'a Value> {
    template["Resources"]
        .as_object()
        .unwrap()
        .values()
        .filter(|r| r["Type"] == resource_type)
        .collect()
}

fn single<'a>(template: &'a Value, resource_type: &str) -> &'a Value {
    let found = resources_of_type(template, resource_type);
    assert_eq!(found.len(), 1, "expected one {}", resource_type);
    found[0]
}

#[tokio::test]
async fn test_default_stack_template() {
    let assembly = default_engine().synth().await.unwrap();
    let template = assembly.template_json().unwrap();

    assert_eq!(assembly.template_file(), "ecsworkshop-capacityproviders-ec2.template.json");

    let task_def = single(&template, "AWS::ECS::TaskDefinition");
    let containers = task_def["Properties"]["ContainerDefinitions"].as_array().unwrap();
    assert_eq!(containers.len(), 1);
    let container = &containers[0];
    assert_eq!(container["Image"], "adam9098/ecsdemo-capacityproviders:latest");
    assert_eq!(container["PortMappings"][0]["ContainerPort"], 5000);
    assert_eq!(container["Cpu"], 256);
    assert_eq!(container["Memory"], 512);
    assert_eq!(
        container["Environment"],
        json!([{ "Name": "AWS_DEFAULT_REGION", "Value": "us-west-2" }])
    );

    let service = single(&template, "AWS::ECS::Service");
    assert_eq!(service["Properties"]["DesiredCount"], 3);
    assert!(service["Properties"].get("LaunchType").is_none());
    assert_eq!(
        service["Properties"]["Cluster"],
        json!({ "Fn::ImportValue": "ECSClusterName" })
    );

    let load_balancer = single(&template, "AWS::ElasticLoadBalancingV2::LoadBalancer");
    assert_eq!(load_balancer["Properties"]["Scheme"], "internet-facing");
    assert_eq!(
        load_balancer["Properties"]["Subnets"],
        json!(["subnet-pub-a", "subnet-pub-b"])
    );
}

#[tokio::test]
async fn test_task_role_gets_introspection_policy() {
    let template = default_engine().synth().await.unwrap().template_json().unwrap();
    let task_def = single(&template, "AWS::ECS::TaskDefinition");
    let task_role_id = task_def["Properties"]["TaskRoleArn"]["Fn::GetAtt"][0].clone();

    let task_role_policies: Vec<&Value> = resources_of_type(&template, "AWS::IAM::Policy")
        .into_iter()
        .filter(|p| p["Properties"]["Roles"] == json!([{ "Ref": task_role_id }]))
        .collect();
    assert_eq!(task_role_policies.len(), 1);

    let statements = task_role_policies[0]["Properties"]["PolicyDocument"]["Statement"]
        .as_array()
        .unwrap();
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0]["Effect"], "Allow");
    assert_eq!(statements[0]["Action"], json!(["ecs:ListTasks", "ecs:DescribeTasks"]));
    assert_eq!(statements[0]["Resource"], "*");
}

#[tokio::test]
async fn test_every_cluster_security_group_admits_the_load_balancer() {
    let template = default_engine().synth().await.unwrap().template_json().unwrap();
    let ingress = resources_of_type(&template, "AWS::EC2::SecurityGroupIngress");

    let groups: Vec<&Value> = ingress.iter().map(|r| &r["Properties"]["GroupId"]).collect();
    for export in ["ECSSecGrpList1", "ECSSecGrpList2", "ECSSecGrpList3"] {
        assert!(groups.contains(&&json!({ "Fn::ImportValue": export })));
    }
    for rule in ingress {
        assert_eq!(rule["Properties"]["FromPort"], 32768);
        assert_eq!(rule["Properties"]["ToPort"], 65535);
    }
}

#[tokio::test]
async fn test_synthesis_is_reproducible() {
    let first = default_engine().synth().await.unwrap();
    let second = default_engine().synth().await.unwrap();

    assert_eq!(first.template_bytes(), second.template_bytes());
    assert_eq!(first.template_digest(), second.template_digest());
}

#[tokio::test]
async fn test_run_writes_assembly() {
    let dir = TempDir::new().unwrap();
    let storage = LocalStorage::new(dir.path());

    let report = assert_ok!(default_engine().run(&storage).await);

    assert_eq!(report.stack_name, "ecsworkshop-capacityproviders-ec2");
    assert!(report.resource_count > 10);
    let written = std::fs::read(dir.path().join(&report.template_file)).unwrap();
    let template: Value = serde_json::from_slice(&written).unwrap();
    assert_eq!(template["Resources"].as_object().unwrap().len(), report.resource_count);

    let manifest: Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("manifest.json")).unwrap()).unwrap();
    assert_eq!(
        manifest["artifacts"]["ecsworkshop-capacityproviders-ec2"]["environment"],
        "aws://123456789012/us-west-2"
    );
}

#[tokio::test]
async fn test_missing_exports_fail_without_output() {
    let mut context = context();
    let key = "exports-provider:account=123456789012:region=us-west-2";
    let mut exports = context.exports_for(&environment()).unwrap().unwrap();
    exports.remove("NSARN");
    exports.remove("ECSSecGrpList2");
    context.remove(key);
    context.put_exports(&environment(), exports).unwrap();

    let dir = TempDir::new().unwrap();
    let storage = LocalStorage::new(dir.path());
    let engine = SynthEngine::new(StackConfig::new("ecsworkshop", environment()), context);

    let err = engine.run(&storage).await.unwrap_err();
    match &err {
        SynthError::MissingExportError { names } => {
            assert!(names.contains(&"NSARN".to_string()));
            assert!(names.contains(&"ECSSecGrpList2".to_string()));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.category(), ErrorCategory::Lookup);
    assert_eq!(err.exit_code(), 2);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_failed_manifest_write_removes_template() {
    let dir = TempDir::new().unwrap();
    // 同名目錄讓 manifest 寫入失敗
    std::fs::create_dir(dir.path().join("manifest.json")).unwrap();
    let storage = LocalStorage::new(dir.path());

    let err = assert_err!(default_engine().run(&storage).await);

    assert_eq!(err.category(), ErrorCategory::Output);
    assert_eq!(err.exit_code(), 3);
    let left: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(left, vec!["manifest.json"]);
}

#[tokio::test]
async fn test_unknown_vpc_is_a_lookup_error() {
    let engine = SynthEngine::new(StackConfig::new("staging", environment()), context());
    let err = assert_err!(engine.synth().await);
    assert!(matches!(err, SynthError::ContextLookupError { .. }));
}

#[tokio::test]
async fn test_invalid_configuration_stops_before_lookup() {
    let mut config = StackConfig::new("ecsworkshop", environment());
    config.policy.actions.push("ecs:UpdateService".to_string());

    // 空 context：若先查詢會得到查詢錯誤而不是配置錯誤
    let engine = SynthEngine::new(config, ContextFile::default());
    let err = engine.synth().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
async fn test_stack_file_overrides_flow_into_template() {
    let config = StackFile::from_toml_str(
        r#"
[stack]
account = "123456789012"
region = "us-west-2"

[service]
desired_count = 5
public_load_balancer = false

[service.environment]
LOG_LEVEL = "debug"

[patch]
remove_launch_type = false
"#,
    )
    .unwrap()
    .resolve(None)
    .unwrap();

    let template = SynthEngine::new(config, context())
        .synth()
        .await
        .unwrap()
        .template_json()
        .unwrap();

    let service = single(&template, "AWS::ECS::Service");
    assert_eq!(service["Properties"]["DesiredCount"], 5);
    assert_eq!(service["Properties"]["LaunchType"], "EC2");

    let load_balancer = single(&template, "AWS::ElasticLoadBalancingV2::LoadBalancer");
    assert_eq!(load_balancer["Properties"]["Scheme"], "internal");
    assert_eq!(
        load_balancer["Properties"]["Subnets"],
        json!(["subnet-priv-a", "subnet-priv-b"])
    );

    let task_def = single(&template, "AWS::ECS::TaskDefinition");
    assert_eq!(
        task_def["Properties"]["ContainerDefinitions"][0]["Environment"],
        json!([
            { "Name": "AWS_DEFAULT_REGION", "Value": "us-west-2" },
            { "Name": "LOG_LEVEL", "Value": "debug" }
        ])
    );
}
