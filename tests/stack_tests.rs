//! Integration tests for the synthesized RDS Postgres stack.
//!
//! These tests cover:
//! - Resource counts of the default configuration
//! - Credential wiring between the database and its secret
//! - Output presence, values and export names
//! - Determinism and logical id scheme
//! - Isolation of instance class / storage changes

mod common;

use common::*;
use pgstack::config::{Config, StackRevision};
use pgstack::constructs::ec2::{InstanceClass, InstanceSize, InstanceType};
use pgstack::diff::TemplateDiff;
use pgstack::graph::ResourceGraph;
use pgstack::naming;
use pgstack::stacks::rds_postgres::outputs;
use pgstack::template::PATH_METADATA_KEY;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashSet;

// ============================================================================
// Resource Counts
// ============================================================================

#[test]
fn test_default_resource_counts() {
    let template = default_template();

    assert_eq!(template.count_of_type("AWS::EC2::VPC"), 1);
    assert_eq!(template.count_of_type("AWS::RDS::DBInstance"), 1);
    assert_eq!(template.count_of_type("AWS::SecretsManager::Secret"), 1);
    assert_eq!(template.count_of_type("AWS::EC2::VPCEndpoint"), 4);
    assert_eq!(template.count_of_type("AWS::EC2::NatGateway"), 1);
    assert_eq!(template.count_of_type("AWS::EC2::Subnet"), 4);
    assert_eq!(template.count_of_type("AWS::IAM::Role"), 1);
}

#[test]
fn test_endpoint_kinds() {
    let template = default_template();

    let mut interface = Vec::new();
    let mut gateway = Vec::new();
    for (_, endpoint) in template.resources_of_type("AWS::EC2::VPCEndpoint") {
        let service = endpoint.properties["ServiceName"].clone();
        match endpoint.properties["VpcEndpointType"].as_str() {
            Some("Interface") => interface.push(service),
            Some("Gateway") => gateway.push(service),
            other => panic!("unexpected endpoint type {:?}", other),
        }
    }
    assert_eq!(interface.len(), 3);
    assert_eq!(gateway.len(), 1);

    let rendered = serde_json::to_string(&gateway[0]).unwrap();
    assert!(rendered.contains(".s3"), "{}", rendered);
}

#[test]
fn test_rule_descriptions_resolve() {
    let template = default_template();
    let mut joined = 0;
    for (id, sg) in template.resources_of_type("AWS::EC2::SecurityGroup") {
        let Some(rules) = sg.properties.get("SecurityGroupIngress") else {
            continue;
        };
        for rule in rules.as_array().unwrap() {
            let description = serde_json::to_string(&rule["Description"]).unwrap();
            assert!(!description.contains("${"), "{}: {}", id, description);
            if rule["Description"]["Fn::Join"].is_array() {
                joined += 1;
            }
        }
    }
    // one per interface endpoint
    assert_eq!(joined, 3);
}

#[test]
fn test_revision_resource_counts() {
    let baseline = synth(&config_for(StackRevision::Baseline));
    assert_eq!(baseline.count_of_type("AWS::EC2::VPCEndpoint"), 0);
    assert_eq!(baseline.count_of_type("AWS::EC2::NatGateway"), 2);

    let single_nat = synth(&config_for(StackRevision::SingleNat));
    assert_eq!(single_nat.count_of_type("AWS::EC2::VPCEndpoint"), 0);
    assert_eq!(single_nat.count_of_type("AWS::EC2::NatGateway"), 1);

    for template in [&baseline, &single_nat] {
        assert_eq!(template.count_of_type("AWS::EC2::VPC"), 1);
        assert_eq!(template.count_of_type("AWS::RDS::DBInstance"), 1);
        assert_eq!(template.count_of_type("AWS::SecretsManager::Secret"), 1);
    }
}

// ============================================================================
// Credentials
// ============================================================================

#[test]
fn test_credentials_reference_secret() {
    let template = default_template();
    let (secret_id, _) = single_of_type(&template, "AWS::SecretsManager::Secret");
    let (_, db) = single_of_type(&template, "AWS::RDS::DBInstance");

    for property in ["MasterUsername", "MasterUserPassword"] {
        let value = &db.properties[property];
        assert!(
            references_in(value).contains(secret_id),
            "{} does not reference {}",
            property,
            secret_id
        );
        let rendered = serde_json::to_string(value).unwrap();
        assert!(rendered.contains("{{resolve:secretsmanager:"));
    }

    let username = serde_json::to_string(&db.properties["MasterUsername"]).unwrap();
    assert!(username.contains(":SecretString:username::"));
    let password = serde_json::to_string(&db.properties["MasterUserPassword"]).unwrap();
    assert!(password.contains(":SecretString:password::"));
}

#[test]
fn test_custom_password_key() {
    let mut config = Config::default();
    config.secret.password_key = "pw".into();
    config.validate().unwrap();

    let template = synth(&config);
    let (_, secret) = single_of_type(&template, "AWS::SecretsManager::Secret");
    assert_eq!(
        secret.properties["GenerateSecretString"]["GenerateStringKey"],
        json!("pw")
    );

    let (_, db) = single_of_type(&template, "AWS::RDS::DBInstance");
    let password = serde_json::to_string(&db.properties["MasterUserPassword"]).unwrap();
    assert!(password.contains(":SecretString:pw::"));
    let username = serde_json::to_string(&db.properties["MasterUsername"]).unwrap();
    assert!(username.contains(":SecretString:username::"));
}

#[test]
fn test_secret_generator_settings() {
    let template = default_template();
    let (_, secret) = single_of_type(&template, "AWS::SecretsManager::Secret");

    let generator = &secret.properties["GenerateSecretString"];
    assert_eq!(generator["GenerateStringKey"], json!("password"));
    assert_eq!(generator["ExcludePunctuation"], json!(true));
    assert_eq!(generator["ExcludeCharacters"], json!("\"@/"));

    let fixed: Value =
        serde_json::from_str(generator["SecretStringTemplate"].as_str().unwrap()).unwrap();
    assert_eq!(fixed, json!({"username": "postgresadmin"}));
}

#[test]
fn test_secret_attachment_targets_instance() {
    let template = default_template();
    let (db_id, _) = single_of_type(&template, "AWS::RDS::DBInstance");
    let (secret_id, _) = single_of_type(&template, "AWS::SecretsManager::Secret");
    let (_, attachment) =
        single_of_type(&template, "AWS::SecretsManager::SecretTargetAttachment");

    assert_eq!(attachment.properties["TargetId"], json!({"Ref": db_id}));
    assert_eq!(attachment.properties["SecretId"], json!({"Ref": secret_id}));
    assert_eq!(
        attachment.properties["TargetType"],
        json!("AWS::RDS::DBInstance")
    );
}

// ============================================================================
// Database
// ============================================================================

#[test]
fn test_database_properties() {
    let template = default_template();
    let (_, db) = single_of_type(&template, "AWS::RDS::DBInstance");

    assert_eq!(db.properties["Engine"], json!("postgres"));
    assert_eq!(db.properties["EngineVersion"], json!("15.3"));
    assert_eq!(db.properties["DBInstanceClass"], json!("db.t3.micro"));
    assert_eq!(db.properties["AllocatedStorage"], json!("15"));
    assert_eq!(db.properties["BackupRetentionPeriod"], json!(3));
    assert_eq!(db.properties["DBName"], json!("my_initial_database"));
    assert_eq!(
        db.deletion_policy,
        Some(pgstack::template::DeletionPolicy::Delete)
    );
}

#[test]
fn test_subnet_group_uses_private_subnets() {
    let built = build(&Config::default());
    let template = built.synth().unwrap();
    let (_, group) = single_of_type(&template, "AWS::RDS::DBSubnetGroup");

    let expected: Vec<Value> = built
        .vpc
        .private_subnets
        .iter()
        .map(|s| s.subnet_id.to_value())
        .collect();
    assert_eq!(group.properties["SubnetIds"], Value::Array(expected));
}

#[test]
fn test_role_can_connect() {
    let built = build(&Config::default());
    let template = built.synth().unwrap();

    let policies: Vec<_> = template.resources_of_type("AWS::IAM::Policy").collect();
    assert_eq!(policies.len(), 1);
    let rendered = serde_json::to_string(&policies[0].1.properties).unwrap();
    assert!(rendered.contains("rds-db:connect"));
    assert!(rendered.contains("dbuser:"));
    assert!(rendered.contains("/postgresadmin"));
    assert!(references_in(&policies[0].1.properties["Roles"]).contains(&built.role.logical_id));
}

// ============================================================================
// Outputs
// ============================================================================

#[test]
fn test_outputs_present_and_non_empty() {
    let template = default_template();

    for id in [
        outputs::VPC_ID,
        outputs::PRIVATE_SUBNETS,
        outputs::PUBLIC_SUBNETS,
        outputs::AVAILABILITY_ZONES,
        outputs::DATABASE_NAME,
        outputs::ENDPOINT_ADDRESS,
        outputs::ENDPOINT_PORT,
        outputs::SECURITY_GROUP_ID,
    ] {
        let output = template
            .outputs
            .get(id)
            .unwrap_or_else(|| panic!("missing output {}", id));
        assert!(output.has_value(), "output {} is empty", id);
    }
    assert_eq!(template.outputs.len(), 8);
}

#[test]
fn test_output_exports() {
    let template = default_template();

    assert_eq!(template.outputs[outputs::VPC_ID].export_name(), None);
    for (id, output) in &template.outputs {
        if id == outputs::VPC_ID {
            continue;
        }
        assert_eq!(output.export_name(), Some(format!("{}-2", id).as_str()));
    }
    assert_eq!(
        template.outputs[outputs::DATABASE_NAME].value,
        json!("my_initial_database")
    );
}

#[test]
fn test_output_references_resolve() {
    let template = default_template();
    for (id, output) in &template.outputs {
        for target in references_in(&output.value) {
            assert!(
                template.resources.contains_key(&target) || target.starts_with("AWS::"),
                "output {} references unknown {}",
                id,
                target
            );
        }
    }
}

// ============================================================================
// Determinism and Naming
// ============================================================================

#[test]
fn test_synthesis_is_deterministic() {
    let first = default_template().to_json_pretty().unwrap();
    let second = default_template().to_json_pretty().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_logical_ids_follow_path_scheme() {
    let template = default_template();

    let mut seen = HashSet::new();
    for (id, resource) in &template.resources {
        assert!(seen.insert(id.clone()), "duplicate logical id {}", id);

        let path = resource
            .metadata
            .get(PATH_METADATA_KEY)
            .and_then(Value::as_str)
            .unwrap_or_else(|| panic!("{} has no path metadata", id));
        let (stack_name, construct_path) = path.split_once('/').unwrap();
        assert_eq!(stack_name, "CdkRdsPgdslStack");
        assert_eq!(naming::logical_id(construct_path).as_deref(), Some(id.as_str()));
    }
}

#[test]
fn test_graph_is_acyclic() {
    let template = default_template();
    let graph = ResourceGraph::from_template(&template).unwrap();
    assert!(!graph.has_cycles());

    let order = graph.deployment_order().unwrap();
    assert_eq!(order.len(), template.resources.len());

    let (db_id, _) = single_of_type(&template, "AWS::RDS::DBInstance");
    let (secret_id, _) = single_of_type(&template, "AWS::SecretsManager::Secret");
    let position = |id: &str| order.iter().position(|o| o == id).unwrap();
    assert!(position(secret_id) < position(db_id));
}

// ============================================================================
// Change Isolation
// ============================================================================

#[test]
fn test_instance_class_change_is_isolated() {
    let before = default_template();
    let mut config = Config::default();
    config.database.instance_type = InstanceType::of(InstanceClass::Burstable3, InstanceSize::Small);
    let after = synth(&config);

    let diff = TemplateDiff::between(&before, &after);
    let (db_id, _) = single_of_type(&before, "AWS::RDS::DBInstance");

    assert_eq!(diff.resources.len(), 1);
    let change = diff.resource(db_id).unwrap();
    assert_eq!(change.changes.len(), 1);
    assert_eq!(change.changes[0].path, "Properties.DBInstanceClass");
    assert_eq!(change.changes[0].new, Some(json!("db.t3.small")));
    assert!(diff.outputs.is_empty());
}

#[test]
fn test_allocated_storage_change_is_isolated() {
    let before = default_template();
    let mut config = Config::default();
    config.database.allocated_storage = 50;
    let after = synth(&config);

    let diff = TemplateDiff::between(&before, &after);
    let stats = diff.stats();
    assert_eq!(stats.resources_modified, 1);
    assert_eq!(stats.property_changes, 1);
    assert_eq!(stats.resources_added + stats.resources_removed, 0);
    assert_eq!(
        diff.resources[0].changes[0].path,
        "Properties.AllocatedStorage"
    );
}

#[test]
fn test_revision_change_adds_endpoints() {
    let before = synth(&config_for(StackRevision::SingleNat));
    let after = synth(&config_for(StackRevision::Endpoints));

    let diff = TemplateDiff::between(&before, &after);
    let stats = diff.stats();
    assert_eq!(stats.resources_removed, 0);
    assert!(stats.resources_added >= 4);
    assert!(diff
        .outputs
        .iter()
        .any(|o| o.id == outputs::PUBLIC_SUBNETS));
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_invalid_configuration_is_rejected() {
    let mut config = Config::default();
    config.network.max_azs = 1;
    let err = pgstack::stacks::RdsPostgresStack::build_with_env(&config, test_env()).unwrap_err();
    assert!(err.is_user_error());
}
