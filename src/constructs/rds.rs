//! Managed database instances.
//!
//! A [`DatabaseInstance`] declares three resources: a subnet group spanning
//! the selected subnets, a security group of its own, and the instance. The
//! master credentials are dynamic references into a [`Secret`], so the secret
//! always precedes the instance in the resource graph.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ec2::{
    InstanceType, Peer, Port, SecurityGroup, SecurityGroupProps, SubnetType, Vpc,
};
use super::iam::{PolicyStatement, Role};
use super::secretsmanager::{Secret, USERNAME_FIELD};
use crate::error::{Error, Result};
use crate::stack::Stack;
use crate::template::{DeletionPolicy, Resource, Token};

/// Largest backup retention the service accepts, in days.
pub const MAX_BACKUP_RETENTION_DAYS: u32 = 35;
/// Largest allocated storage, in GiB.
pub const MAX_ALLOCATED_STORAGE_GIB: u32 = 65_536;

/// PostgreSQL engine at a given version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseEngine {
    /// Full version, e.g. `15.3`
    pub version: String,
}

impl DatabaseEngine {
    /// Engine name as the service spells it.
    pub const NAME: &'static str = "postgres";
    /// Port the engine listens on unless told otherwise.
    pub const DEFAULT_PORT: u16 = 5432;

    /// PostgreSQL at `version`.
    pub fn postgres(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

/// What happens to the instance when it leaves the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    /// Delete the instance and its data
    #[default]
    Destroy,
    /// Keep the instance
    Retain,
    /// Take a final snapshot, then delete
    Snapshot,
}

impl From<RemovalPolicy> for DeletionPolicy {
    fn from(policy: RemovalPolicy) -> Self {
        match policy {
            RemovalPolicy::Destroy => DeletionPolicy::Delete,
            RemovalPolicy::Retain => DeletionPolicy::Retain,
            RemovalPolicy::Snapshot => DeletionPolicy::Snapshot,
        }
    }
}

/// Master credentials.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials<'a> {
    secret: &'a Secret,
    username_field: String,
    password_field: String,
}

impl<'a> Credentials<'a> {
    /// Username and password read from the `username` and `password` fields
    /// of a JSON secret.
    pub fn from_secret(secret: &'a Secret) -> Self {
        Self::from_secret_fields(secret, USERNAME_FIELD, "password")
    }

    /// Username and password read from the named fields of a JSON secret.
    pub fn from_secret_fields(
        secret: &'a Secret,
        username_field: impl Into<String>,
        password_field: impl Into<String>,
    ) -> Self {
        Self {
            secret,
            username_field: username_field.into(),
            password_field: password_field.into(),
        }
    }
}

/// Properties for [`DatabaseInstance::new`].
#[derive(Debug, Clone)]
pub struct DatabaseInstanceProps<'a> {
    /// Engine and version
    pub engine: DatabaseEngine,
    /// Instance class and size
    pub instance_type: InstanceType,
    /// VPC to place the instance in
    pub vpc: &'a Vpc,
    /// Subnets for the subnet group; `None` picks the most private kind
    pub subnet_type: Option<SubnetType>,
    /// Master credentials
    pub credentials: Credentials<'a>,
    /// Initial database
    pub database_name: Option<String>,
    /// Storage in GiB
    pub allocated_storage: u32,
    /// `gp2`, `gp3`, `io1`, ...
    pub storage_type: String,
    /// Automated backup retention in days (0 disables backups)
    pub backup_retention_days: u32,
    /// Standby in a second zone
    pub multi_az: bool,
    /// Reachable from outside the VPC
    pub publicly_accessible: bool,
    /// Refuse deletion through the API
    pub deletion_protection: bool,
    /// Removal behavior
    pub removal_policy: RemovalPolicy,
}

impl<'a> DatabaseInstanceProps<'a> {
    /// Props with the usual defaults: 20 GiB gp2, 1 day of backups,
    /// single zone, private, destroyed with the stack.
    pub fn new(
        engine: DatabaseEngine,
        instance_type: InstanceType,
        vpc: &'a Vpc,
        credentials: Credentials<'a>,
    ) -> Self {
        Self {
            engine,
            instance_type,
            vpc,
            subnet_type: None,
            credentials,
            database_name: None,
            allocated_storage: 20,
            storage_type: "gp2".to_string(),
            backup_retention_days: 1,
            multi_az: false,
            publicly_accessible: false,
            deletion_protection: false,
            removal_policy: RemovalPolicy::Destroy,
        }
    }
}

/// Handle to a declared database instance.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseInstance {
    /// Construct path
    pub path: String,
    /// Logical id of the `AWS::RDS::DBInstance`
    pub logical_id: String,
    /// `Endpoint.Address` attribute
    pub endpoint_address: Token,
    /// `Endpoint.Port` attribute
    pub endpoint_port: Token,
    /// `DbiResourceId` attribute
    pub resource_id: Token,
    /// Logical id of the secret attachment
    pub secret_attachment: Token,
    /// The instance's own security group
    pub security_group: SecurityGroup,
}

impl DatabaseInstance {
    /// Declare a database instance under `id`.
    pub fn new(stack: &mut Stack, id: &str, props: DatabaseInstanceProps<'_>) -> Result<Self> {
        validate(id, &props)?;

        let subnets = props.vpc.select_subnets(props.subnet_type)?;
        if subnets.len() < 2 {
            return Err(Error::validation(
                id,
                "a database subnet group needs subnets in at least two availability zones",
            ));
        }
        let subnet_ids: Vec<_> = subnets.iter().map(|s| s.subnet_id.to_value()).collect();

        let subnet_group = stack.add_resource(
            &format!("{}/SubnetGroup/Default", id),
            Resource::new("AWS::RDS::DBSubnetGroup")
                .property(
                    "DBSubnetGroupDescription",
                    format!("Subnet group for {} database", id),
                )
                .property("SubnetIds", subnet_ids),
        )?;

        let security_group = SecurityGroup::new(
            stack,
            &format!("{}/SecurityGroup", id),
            SecurityGroupProps::new(props.vpc.vpc_id.clone())
                .with_description(format!("Security group for {} database", id)),
        )?;

        let credentials = &props.credentials;
        let username = credentials
            .secret
            .secret_value_from_json(&credentials.username_field)?;
        let password = credentials
            .secret
            .secret_value_from_json(&credentials.password_field)?;

        let mut resource = Resource::new("AWS::RDS::DBInstance")
            .property("AllocatedStorage", props.allocated_storage.to_string())
            .property("BackupRetentionPeriod", props.backup_retention_days)
            .property("CopyTagsToSnapshot", true)
            .property("DBInstanceClass", props.instance_type.rds_class())
            .optional_property("DBName", props.database_name.clone())
            .property("DBSubnetGroupName", Token::reference(&subnet_group))
            .property("Engine", DatabaseEngine::NAME)
            .property("EngineVersion", props.engine.version.clone())
            .property("MasterUsername", username)
            .property("MasterUserPassword", password)
            .property("MultiAZ", props.multi_az)
            .property("PubliclyAccessible", props.publicly_accessible)
            .property("StorageType", props.storage_type.clone())
            .property(
                "VPCSecurityGroups",
                vec![security_group.group_id.to_value()],
            )
            .with_policies(props.removal_policy.into());
        if props.deletion_protection {
            resource = resource.property("DeletionProtection", true);
        }
        let logical_id = stack.add_resource(&format!("{}/Resource", id), resource)?;
        let instance_ref = Token::reference(&logical_id);

        let secret_attachment =
            credentials
                .secret
                .attach(stack, &instance_ref, "AWS::RDS::DBInstance")?;

        debug!(
            instance = %id,
            engine = DatabaseEngine::NAME,
            version = %props.engine.version,
            class = %props.instance_type.rds_class(),
            "Declared database instance"
        );

        Ok(Self {
            path: id.to_string(),
            endpoint_address: Token::get_att(&logical_id, "Endpoint.Address"),
            endpoint_port: Token::get_att(&logical_id, "Endpoint.Port"),
            resource_id: Token::get_att(&logical_id, "DbiResourceId"),
            logical_id,
            secret_attachment,
            security_group,
        })
    }

    /// Let `role` open IAM-authenticated connections as `user`.
    pub fn grant_connect(&self, stack: &mut Stack, role: &mut Role, user: &str) -> Result<()> {
        if user.is_empty() {
            return Err(Error::validation(&self.path, "database user must not be empty"));
        }
        let arn = stack.format_arn(
            "rds-db",
            vec![
                Token::literal("dbuser:"),
                self.resource_id.clone(),
                Token::literal(format!("/{}", user)),
            ],
        );
        role.add_to_policy(stack, PolicyStatement::allow(["rds-db:connect"], vec![arn]))
    }

    /// Allow `peer` to reach the engine's default port.
    pub fn allow_default_port_from(
        &self,
        stack: &mut Stack,
        peer: &Peer,
        description: Option<&str>,
    ) -> Result<()> {
        self.security_group.add_ingress_rule(
            stack,
            peer,
            Port::tcp(DatabaseEngine::DEFAULT_PORT),
            description,
        )
    }
}

fn validate(id: &str, props: &DatabaseInstanceProps<'_>) -> Result<()> {
    if props.engine.version.is_empty()
        || !props
            .engine
            .version
            .split('.')
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
    {
        return Err(Error::validation(
            id,
            format!("engine version '{}' is not numeric", props.engine.version),
        ));
    }
    if props.allocated_storage == 0 || props.allocated_storage > MAX_ALLOCATED_STORAGE_GIB {
        return Err(Error::validation(
            id,
            format!(
                "allocated storage must be between 1 and {} GiB, got {}",
                MAX_ALLOCATED_STORAGE_GIB, props.allocated_storage
            ),
        ));
    }
    if props.backup_retention_days > MAX_BACKUP_RETENTION_DAYS {
        return Err(Error::validation(
            id,
            format!(
                "backup retention must be at most {} days, got {}",
                MAX_BACKUP_RETENTION_DAYS, props.backup_retention_days
            ),
        ));
    }
    if let Some(name) = &props.database_name {
        let valid = name.len() <= 63
            && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(Error::validation(
                id,
                format!(
                    "database name '{}' must start with a letter and contain only letters, digits and underscores",
                    name
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructs::ec2::VpcProps;
    use crate::constructs::iam::{RoleProps, ServicePrincipal};
    use crate::constructs::secretsmanager::{SecretProps, SecretStringGenerator};
    use crate::stack::Environment;
    use crate::graph::ResourceGraph;
    use serde_json::json;

    struct Fixture {
        stack: Stack,
        vpc: Vpc,
        secret: Secret,
    }

    fn fixture() -> Fixture {
        let mut stack = Stack::new("S", Environment::new("123456789012", "eu-west-1"));
        let vpc = Vpc::new(
            &mut stack,
            "Vpc",
            VpcProps {
                max_azs: 2,
                ..VpcProps::default()
            },
        )
        .unwrap();
        let secret = Secret::new(
            &mut stack,
            "DBSecret",
            SecretProps {
                generate_secret_string: SecretStringGenerator::for_username(
                    "postgresadmin",
                    "password",
                ),
                description: None,
            },
        )
        .unwrap();
        Fixture { stack, vpc, secret }
    }

    fn props<'a>(vpc: &'a Vpc, secret: &'a Secret) -> DatabaseInstanceProps<'a> {
        let mut props = DatabaseInstanceProps::new(
            DatabaseEngine::postgres("15.3"),
            InstanceType::default(),
            vpc,
            Credentials::from_secret(secret),
        );
        props.allocated_storage = 15;
        props.backup_retention_days = 3;
        props.database_name = Some("my_initial_database".into());
        props
    }

    #[test]
    fn test_instance_descriptor() {
        let Fixture {
            mut stack,
            vpc,
            secret,
        } = fixture();
        let db = DatabaseInstance::new(&mut stack, "DatabaseInstance", props(&vpc, &secret))
            .unwrap();
        let template = stack.synth().unwrap();
        let instance = &template.resources[&db.logical_id];

        assert_eq!(instance.properties["AllocatedStorage"], json!("15"));
        assert_eq!(instance.properties["DBInstanceClass"], json!("db.t3.micro"));
        assert_eq!(instance.properties["Engine"], json!("postgres"));
        assert_eq!(instance.properties["EngineVersion"], json!("15.3"));
        assert_eq!(instance.properties["BackupRetentionPeriod"], json!(3));
        assert_eq!(instance.deletion_policy, Some(DeletionPolicy::Delete));
        assert_eq!(template.count_of_type("AWS::RDS::DBSubnetGroup"), 1);
        assert_eq!(
            template.count_of_type("AWS::SecretsManager::SecretTargetAttachment"),
            1
        );
    }

    #[test]
    fn test_secret_precedes_instance() {
        let Fixture {
            mut stack,
            vpc,
            secret,
        } = fixture();
        let db = DatabaseInstance::new(&mut stack, "DatabaseInstance", props(&vpc, &secret))
            .unwrap();
        let template = stack.synth().unwrap();
        let graph = ResourceGraph::from_template(&template).unwrap();
        assert!(graph.depends_on(&db.logical_id, &secret.logical_id));

        let order = graph.deployment_order().unwrap();
        let secret_pos = order.iter().position(|id| id == &secret.logical_id);
        let db_pos = order.iter().position(|id| id == &db.logical_id);
        assert!(secret_pos < db_pos);
    }

    #[test]
    fn test_grant_connect_and_default_port() {
        let Fixture {
            mut stack,
            vpc,
            secret,
        } = fixture();
        let db = DatabaseInstance::new(&mut stack, "DatabaseInstance", props(&vpc, &secret))
            .unwrap();
        let mut role = Role::new(
            &mut stack,
            "RDSRole",
            RoleProps::new(ServicePrincipal::new("rds.amazonaws.com")),
        )
        .unwrap();
        db.grant_connect(&mut stack, &mut role, "postgresadmin").unwrap();
        db.allow_default_port_from(&mut stack, &Peer::Ipv4(vpc.cidr_block.clone()), None)
            .unwrap();

        let template = stack.synth().unwrap();
        let policy = &template.resources[role.default_policy().unwrap()];
        let statement = &policy.properties["PolicyDocument"]["Statement"][0];
        assert_eq!(statement["Action"], json!("rds-db:connect"));
        assert_eq!(
            statement["Resource"],
            json!({"Fn::Join": ["", [
                "arn:",
                {"Ref": "AWS::Partition"},
                ":rds-db:eu-west-1:123456789012:dbuser:",
                {"Fn::GetAtt": [db.logical_id, "DbiResourceId"]},
                "/postgresadmin"
            ]]})
        );

        let sg = &template.resources[&db.security_group.logical_id];
        let ingress = &sg.properties["SecurityGroupIngress"][0];
        assert_eq!(ingress["FromPort"], json!(5432));
        assert_eq!(ingress["ToPort"], json!(5432));
    }

    #[test]
    fn test_invalid_props() {
        let Fixture {
            mut stack,
            vpc,
            secret,
        } = fixture();

        let mut bad = props(&vpc, &secret);
        bad.allocated_storage = 0;
        assert!(DatabaseInstance::new(&mut stack, "A", bad).is_err());

        let mut bad = props(&vpc, &secret);
        bad.backup_retention_days = 36;
        assert!(DatabaseInstance::new(&mut stack, "B", bad).is_err());

        let mut bad = props(&vpc, &secret);
        bad.database_name = Some("1db".into());
        assert!(DatabaseInstance::new(&mut stack, "C", bad).is_err());

        let mut bad = props(&vpc, &secret);
        bad.engine = DatabaseEngine::postgres("latest");
        assert!(DatabaseInstance::new(&mut stack, "D", bad).is_err());
    }

    #[test]
    fn test_removal_policy_mapping() {
        assert_eq!(DeletionPolicy::from(RemovalPolicy::Destroy), DeletionPolicy::Delete);
        assert_eq!(DeletionPolicy::from(RemovalPolicy::Retain), DeletionPolicy::Retain);
        assert_eq!(DeletionPolicy::from(RemovalPolicy::Snapshot), DeletionPolicy::Snapshot);
    }
}
