//! VPC endpoints.
//!
//! Interface endpoints put an elastic network interface in each selected
//! subnet and get their own security group that admits HTTPS from inside the
//! VPC. Gateway endpoints (S3, DynamoDB) are route table entries instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::security_group::{Peer, Port, SecurityGroup, SecurityGroupProps};
use super::vpc::{SubnetType, Vpc};
use crate::error::{Error, Result};
use crate::stack::Stack;
use crate::template::{Resource, Token};

/// An AWS service reachable through an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointService {
    /// `lambda`
    Lambda,
    /// `glue`
    Glue,
    /// `secretsmanager`
    SecretsManager,
    /// `s3`
    S3,
    /// `dynamodb`
    DynamoDb,
    /// Any other service, by short name
    Custom(String),
}

impl EndpointService {
    /// Short service name as used in `com.amazonaws.<region>.<name>`.
    pub fn short_name(&self) -> &str {
        match self {
            EndpointService::Lambda => "lambda",
            EndpointService::Glue => "glue",
            EndpointService::SecretsManager => "secretsmanager",
            EndpointService::S3 => "s3",
            EndpointService::DynamoDb => "dynamodb",
            EndpointService::Custom(name) => name,
        }
    }

    /// PascalCase label used in construct ids (`SecretsManager`).
    pub fn label(&self) -> String {
        match self {
            EndpointService::Lambda => "Lambda".to_string(),
            EndpointService::Glue => "Glue".to_string(),
            EndpointService::SecretsManager => "SecretsManager".to_string(),
            EndpointService::S3 => "S3".to_string(),
            EndpointService::DynamoDb => "DynamoDb".to_string(),
            EndpointService::Custom(name) => name
                .split(|c: char| !c.is_ascii_alphanumeric())
                .filter(|part| !part.is_empty())
                .map(|part| {
                    let mut chars = part.chars();
                    match chars.next() {
                        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                        None => String::new(),
                    }
                })
                .collect(),
        }
    }

    /// Whether the service can be reached through a gateway endpoint.
    pub fn supports_gateway(&self) -> bool {
        matches!(self, EndpointService::S3 | EndpointService::DynamoDb)
    }

    /// Full service name for the stack's region.
    pub fn service_name(&self, stack: &Stack) -> Token {
        Token::join(
            "",
            vec![
                Token::literal("com.amazonaws."),
                stack.region(),
                Token::literal(format!(".{}", self.short_name())),
            ],
        )
    }
}

impl fmt::Display for EndpointService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// Properties for an interface endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceEndpointProps {
    /// Target service
    pub service: EndpointService,
    /// Resolve the public service hostname to the endpoint
    pub private_dns_enabled: bool,
    /// Subnets to place interfaces in; `None` picks the most private kind
    pub subnet_type: Option<SubnetType>,
}

impl InterfaceEndpointProps {
    /// Private DNS on, most private subnets.
    pub fn new(service: EndpointService) -> Self {
        Self {
            service,
            private_dns_enabled: true,
            subnet_type: None,
        }
    }
}

/// Handle to a declared interface endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceVpcEndpoint {
    /// Construct path
    pub path: String,
    /// Logical id of the `AWS::EC2::VPCEndpoint`
    pub logical_id: String,
    /// Endpoint id
    pub endpoint_id: Token,
    /// Security group guarding the interfaces
    pub security_group: SecurityGroup,
}

impl InterfaceVpcEndpoint {
    /// Declare an interface endpoint at `path` inside `vpc`.
    pub fn new(
        stack: &mut Stack,
        path: &str,
        vpc: &Vpc,
        props: InterfaceEndpointProps,
    ) -> Result<Self> {
        if props.service == EndpointService::DynamoDb {
            return Err(Error::validation(
                path,
                "dynamodb is only reachable through a gateway endpoint",
            ));
        }
        let subnets = vpc.select_subnets(props.subnet_type)?;
        let subnet_ids: Vec<_> = subnets.iter().map(|s| s.subnet_id.to_value()).collect();

        let security_group = SecurityGroup::new(
            stack,
            &format!("{}/SecurityGroup", path),
            SecurityGroupProps::new(vpc.vpc_id.clone()),
        )?;
        security_group.add_ingress_rule(
            stack,
            &Peer::Ipv4(vpc.cidr_block.clone()),
            Port::tcp(443),
            None,
        )?;

        let resource = Resource::new("AWS::EC2::VPCEndpoint")
            .property("PrivateDnsEnabled", props.private_dns_enabled)
            .property("SecurityGroupIds", vec![security_group.group_id.to_value()])
            .property("ServiceName", props.service.service_name(stack))
            .property("SubnetIds", subnet_ids)
            .property("VpcEndpointType", "Interface")
            .property("VpcId", vpc.vpc_id.clone());
        let logical_id = stack.add_resource(&format!("{}/Resource", path), resource)?;

        debug!(endpoint = %path, service = %props.service, "Declared interface endpoint");

        Ok(Self {
            path: path.to_string(),
            endpoint_id: Token::reference(&logical_id),
            logical_id,
            security_group,
        })
    }
}

/// Options for a gateway endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEndpointOptions {
    /// Target service (`s3` or `dynamodb`)
    pub service: EndpointService,
    /// Route tables of this subnet kind get the route; `None` means all
    pub subnet_type: Option<SubnetType>,
}

impl GatewayEndpointOptions {
    /// Bound to every route table of the VPC.
    pub fn new(service: EndpointService) -> Self {
        Self {
            service,
            subnet_type: None,
        }
    }

    /// Restrict to the route tables of one subnet kind.
    pub fn in_subnets(mut self, subnet_type: SubnetType) -> Self {
        self.subnet_type = Some(subnet_type);
        self
    }
}

/// Handle to a declared gateway endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayVpcEndpoint {
    /// Construct path
    pub path: String,
    /// Logical id of the `AWS::EC2::VPCEndpoint`
    pub logical_id: String,
    /// Endpoint id
    pub endpoint_id: Token,
}

impl GatewayVpcEndpoint {
    /// Declare a gateway endpoint on the selected route tables of `vpc`.
    pub fn new(
        stack: &mut Stack,
        path: &str,
        vpc: &Vpc,
        options: GatewayEndpointOptions,
    ) -> Result<Self> {
        let service = options.service;
        if !service.supports_gateway() {
            return Err(Error::validation(
                path,
                format!("{} has no gateway endpoint", service),
            ));
        }
        let route_tables: Vec<_> = match options.subnet_type {
            None => vpc
                .all_subnets()
                .map(|s| s.route_table_id.to_value())
                .collect(),
            Some(subnet_type) => vpc
                .select_subnets(Some(subnet_type))?
                .iter()
                .map(|s| s.route_table_id.to_value())
                .collect(),
        };

        let resource = Resource::new("AWS::EC2::VPCEndpoint")
            .property("RouteTableIds", route_tables)
            .property("ServiceName", service.service_name(stack))
            .property("VpcEndpointType", "Gateway")
            .property("VpcId", vpc.vpc_id.clone());
        let logical_id = stack.add_resource(&format!("{}/Resource", path), resource)?;

        debug!(endpoint = %path, service = %service, "Declared gateway endpoint");

        Ok(Self {
            path: path.to_string(),
            endpoint_id: Token::reference(&logical_id),
            logical_id,
        })
    }
}
