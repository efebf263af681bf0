//! The Athena proof-of-concept stack: a VPC, a PostgreSQL instance with a
//! generated master secret, and an IAM role allowed to connect to it.

use tracing::info;

use crate::config::{Config, StackRevision};
use crate::constructs::ec2::{
    GatewayEndpointOptions, InterfaceEndpointProps, InterfaceVpcEndpoint, Peer,
    SubnetConfiguration, SubnetType, Vpc, VpcProps,
};
use crate::constructs::iam::{PolicyStatement, Role, RoleProps, ServicePrincipal};
use crate::constructs::rds::{
    Credentials, DatabaseEngine, DatabaseInstance, DatabaseInstanceProps,
};
use crate::constructs::secretsmanager::{
    Secret, SecretProps, SecretStringGenerator, USERNAME_FIELD,
};
use crate::error::Result;
use crate::stack::{Environment, Stack};
use crate::template::{Output, Template, Token};

/// Subnet prefix length used by the revisions with explicit masks.
pub const DEFAULT_SUBNET_MASK: u8 = 24;

/// Output ids.
pub mod outputs {
    /// VPC id (not exported)
    pub const VPC_ID: &str = "AthenaVpcIdOutput";
    /// Comma-joined private subnet ids
    pub const PRIVATE_SUBNETS: &str = "AthenaVpcPrivateSubnetsOutput";
    /// Comma-joined public subnet ids (revision `endpoints`)
    pub const PUBLIC_SUBNETS: &str = "AthenaVpcPublicSubnetsOutput";
    /// Comma-joined availability zones
    pub const AVAILABILITY_ZONES: &str = "AthenaVpcAvailabilityZonesOutput";
    /// Initial database name
    pub const DATABASE_NAME: &str = "AthenaDatabaseNameOutput";
    /// Instance endpoint host
    pub const ENDPOINT_ADDRESS: &str = "dbInstanceEndpointAddress";
    /// Instance endpoint port
    pub const ENDPOINT_PORT: &str = "dbInstanceEndpointPort";
    /// Instance security group id
    pub const SECURITY_GROUP_ID: &str = "dbSecurityGroupId";
}

/// The declared stack together with handles to its main constructs.
#[derive(Debug, Clone)]
pub struct RdsPostgresStack {
    /// The stack itself
    pub stack: Stack,
    /// Revision it was built for
    pub revision: StackRevision,
    /// Network
    pub vpc: Vpc,
    /// Role granted `rds-db:connect`
    pub role: Role,
    /// Master credentials
    pub secret: Secret,
    /// The database
    pub database: DatabaseInstance,
    /// Interface endpoints (revision `endpoints`)
    pub interface_endpoints: Vec<InterfaceVpcEndpoint>,
}

impl RdsPostgresStack {
    /// Build the stack for the environment described by `config` and the
    /// process environment.
    pub fn build(config: &Config) -> Result<Self> {
        Self::build_with_env(config, Self::environment(config))
    }

    /// Resolve the target environment.
    ///
    /// Configured values win over `CDK_DEFAULT_ACCOUNT` / `CDK_DEFAULT_REGION`,
    /// which in turn win over the literal fallbacks.
    pub fn environment(config: &Config) -> Environment {
        if config.stack.environment_agnostic {
            return Environment::agnostic();
        }
        let from_env = Environment::from_env();
        Environment {
            account: config.stack.account.clone().or(from_env.account),
            region: config.stack.region.clone().or(from_env.region),
        }
    }

    /// Build the stack for an explicit environment.
    pub fn build_with_env(config: &Config, env: Environment) -> Result<Self> {
        config.validate()?;
        let revision = config.stack.revision;

        let mut stack = Stack::new(config.stack.name.clone(), env);
        if let Some(description) = &config.stack.description {
            stack = stack.with_description(description.clone());
        }

        let vpc = Vpc::new(&mut stack, &config.network.vpc_id, vpc_props(config))?;

        let mut role = Role::new(
            &mut stack,
            &config.database.connect_role_id,
            RoleProps::new(ServicePrincipal::new(
                config.database.connect_role_principal.clone(),
            )),
        )?;
        role.add_to_policy(
            &mut stack,
            PolicyStatement::allow(
                ["rds-db:connect", "secretsmanager:GetSecretValue", "sts:AssumeRole"],
                vec![Token::literal("*")],
            ),
        )?;

        let mut generator =
            SecretStringGenerator::for_username(&config.secret.username, &config.secret.password_key);
        generator.exclude_punctuation = config.secret.exclude_punctuation;
        if !config.secret.exclude_characters.is_empty() {
            generator.exclude_characters = Some(config.secret.exclude_characters.clone());
        }
        let secret = Secret::new(
            &mut stack,
            &config.secret.id,
            SecretProps {
                generate_secret_string: generator,
                description: None,
            },
        )?;

        let database = {
            let db = &config.database;
            let credentials =
                Credentials::from_secret_fields(&secret, USERNAME_FIELD, &config.secret.password_key);
            let mut props = DatabaseInstanceProps::new(
                DatabaseEngine::postgres(db.engine_version.clone()),
                db.instance_type,
                &vpc,
                credentials,
            );
            props.allocated_storage = db.allocated_storage;
            props.storage_type = db.storage_type.clone();
            props.backup_retention_days = db.backup_retention_days;
            props.database_name = Some(db.database_name.clone());
            props.multi_az = db.multi_az;
            props.deletion_protection = db.deletion_protection;
            props.removal_policy = db.removal_policy;
            DatabaseInstance::new(&mut stack, &db.id, props)?
        };
        database.grant_connect(&mut stack, &mut role, &config.secret.username)?;

        let mut interface_endpoints = Vec::new();
        if revision == StackRevision::Endpoints {
            for service in &config.network.interface_endpoints {
                let endpoint = vpc.add_interface_endpoint(
                    &mut stack,
                    &format!("{}Endpoint", service.label()),
                    InterfaceEndpointProps::new(service.clone()),
                )?;
                interface_endpoints.push(endpoint);
            }
            database.allow_default_port_from(
                &mut stack,
                &Peer::Ipv4(vpc.cidr_block.clone()),
                Some("Allow database access from within the VPC"),
            )?;
        }

        let mut built = Self {
            stack,
            revision,
            vpc,
            role,
            secret,
            database,
            interface_endpoints,
        };
        built.add_outputs(config)?;

        info!(
            stack = %built.stack.name(),
            revision = %revision,
            resources = built.stack.resource_count(),
            "Built stack"
        );
        Ok(built)
    }

    fn add_outputs(&mut self, config: &Config) -> Result<()> {
        let suffix = &config.outputs.export_suffix;
        let export = |id: &str| format!("{}{}", id, suffix);
        let stack = &mut self.stack;

        stack.add_output(outputs::VPC_ID, Output::new(self.vpc.vpc_id.clone()))?;
        stack.add_output(
            outputs::PRIVATE_SUBNETS,
            Output::new(Vpc::joined_subnet_ids(&self.vpc.private_subnets))
                .with_export(export(outputs::PRIVATE_SUBNETS)),
        )?;
        if self.revision == StackRevision::Endpoints {
            stack.add_output(
                outputs::PUBLIC_SUBNETS,
                Output::new(Vpc::joined_subnet_ids(&self.vpc.public_subnets))
                    .with_export(export(outputs::PUBLIC_SUBNETS)),
            )?;
        }
        stack.add_output(
            outputs::AVAILABILITY_ZONES,
            Output::new(self.vpc.joined_availability_zones())
                .with_export(export(outputs::AVAILABILITY_ZONES)),
        )?;
        stack.add_output(
            outputs::DATABASE_NAME,
            Output::new(config.database.database_name.clone())
                .with_export(export(outputs::DATABASE_NAME)),
        )?;
        stack.add_output(
            outputs::ENDPOINT_ADDRESS,
            Output::new(self.database.endpoint_address.clone())
                .with_export(export(outputs::ENDPOINT_ADDRESS)),
        )?;
        stack.add_output(
            outputs::ENDPOINT_PORT,
            Output::new(self.database.endpoint_port.clone())
                .with_export(export(outputs::ENDPOINT_PORT)),
        )?;
        stack.add_output(
            outputs::SECURITY_GROUP_ID,
            Output::new(self.database.security_group.group_id.clone())
                .with_export(export(outputs::SECURITY_GROUP_ID)),
        )?;
        Ok(())
    }

    /// Synthesize the template.
    pub fn synth(&self) -> Result<Template> {
        self.stack.synth()
    }
}

/// VPC layout for the configured revision.
fn vpc_props(config: &Config) -> VpcProps {
    let network = &config.network;
    let revision = config.stack.revision;

    let (mask, nat_default) = match revision {
        StackRevision::Baseline => (network.subnet_mask, None),
        StackRevision::SingleNat | StackRevision::Endpoints => {
            (Some(network.subnet_mask.unwrap_or(DEFAULT_SUBNET_MASK)), Some(1))
        }
    };
    let group = |name: &str, subnet_type| SubnetConfiguration {
        name: name.to_string(),
        subnet_type,
        cidr_mask: mask,
    };

    let gateway_endpoints = if revision == StackRevision::Endpoints {
        network
            .gateway_endpoints
            .iter()
            .map(|service| {
                (
                    format!("{}Endpoint", service.label()),
                    GatewayEndpointOptions::new(service.clone())
                        .in_subnets(SubnetType::PrivateWithEgress),
                )
            })
            .collect()
    } else {
        Vec::new()
    };

    VpcProps {
        cidr: network.cidr.clone(),
        max_azs: network.max_azs,
        availability_zones: network.availability_zones.clone(),
        subnet_configuration: vec![
            group("Public", SubnetType::Public),
            group("Private", SubnetType::PrivateWithEgress),
        ],
        nat_gateways: network.nat_gateways.or(nat_default),
        gateway_endpoints,
        ..VpcProps::default()
    }
}
