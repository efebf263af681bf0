//! VPC with subnets, routing, internet gateway and NAT gateways.
//!
//! ## Layout
//!
//! Every subnet group in [`VpcProps::subnet_configuration`] gets one subnet
//! per availability zone, named `<group>Subnet<n>`. Each subnet has its own
//! route table. Public subnets route `0.0.0.0/0` to the internet gateway;
//! private-with-egress subnets route it to a NAT gateway placed in a public
//! subnet; isolated subnets have no default route.
//!
//! ## CIDR allocation
//!
//! Groups are allocated in declaration order. Groups with an explicit
//! `cidr_mask` take exactly that; the space left after them is split evenly
//! across the groups without one.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::cidr::{mask_for_space, CidrAllocator, Ipv4Cidr, MAX_SUBNET_MASK, MIN_VPC_MASK};
use super::endpoint::{
    GatewayEndpointOptions, GatewayVpcEndpoint, InterfaceEndpointProps, InterfaceVpcEndpoint,
};
use crate::error::{Error, Result};
use crate::stack::Stack;
use crate::template::{Resource, Token};

/// Kind of subnet group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubnetType {
    /// Routed to the internet gateway
    Public,
    /// Outbound access through a NAT gateway
    PrivateWithEgress,
    /// No route out of the VPC
    PrivateIsolated,
}

impl SubnetType {
    /// Tag value recorded on each subnet.
    pub fn label(&self) -> &'static str {
        match self {
            SubnetType::Public => "Public",
            SubnetType::PrivateWithEgress => "Private",
            SubnetType::PrivateIsolated => "Isolated",
        }
    }
}

/// One subnet group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetConfiguration {
    /// Group name, used in construct ids
    pub name: String,
    /// Group kind
    pub subnet_type: SubnetType,
    /// Prefix length of each subnet; `None` shares the remaining space
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr_mask: Option<u8>,
}

impl SubnetConfiguration {
    /// A group without an explicit mask.
    pub fn new(name: impl Into<String>, subnet_type: SubnetType) -> Self {
        Self {
            name: name.into(),
            subnet_type,
            cidr_mask: None,
        }
    }

    /// Set the prefix length.
    pub fn with_cidr_mask(mut self, mask: u8) -> Self {
        self.cidr_mask = Some(mask);
        self
    }
}

/// Properties for [`Vpc::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct VpcProps {
    /// VPC CIDR block
    pub cidr: String,
    /// Number of availability zones to spread over
    pub max_azs: usize,
    /// Explicit zone names; when empty the zones come from `Fn::GetAZs`
    pub availability_zones: Vec<String>,
    /// Subnet groups
    pub subnet_configuration: Vec<SubnetConfiguration>,
    /// NAT gateway count; `None` means one per zone
    pub nat_gateways: Option<usize>,
    /// `EnableDnsHostnames`
    pub enable_dns_hostnames: bool,
    /// `EnableDnsSupport`
    pub enable_dns_support: bool,
    /// Gateway endpoints declared together with the VPC, by id
    pub gateway_endpoints: Vec<(String, GatewayEndpointOptions)>,
}

impl Default for VpcProps {
    fn default() -> Self {
        Self {
            cidr: "10.0.0.0/16".to_string(),
            max_azs: 3,
            availability_zones: Vec::new(),
            subnet_configuration: Self::default_subnet_configuration(),
            nat_gateways: None,
            enable_dns_hostnames: true,
            enable_dns_support: true,
            gateway_endpoints: Vec::new(),
        }
    }
}

impl VpcProps {
    /// One public and one private-with-egress group sharing the block evenly.
    pub fn default_subnet_configuration() -> Vec<SubnetConfiguration> {
        vec![
            SubnetConfiguration::new("Public", SubnetType::Public),
            SubnetConfiguration::new("Private", SubnetType::PrivateWithEgress),
        ]
    }
}

/// Handle to a declared subnet.
#[derive(Debug, Clone, PartialEq)]
pub struct Subnet {
    /// Construct path (`<vpc>/<group>Subnet<n>`)
    pub path: String,
    /// Logical id of the `AWS::EC2::Subnet`
    pub logical_id: String,
    /// Group name
    pub group_name: String,
    /// Group kind
    pub subnet_type: SubnetType,
    /// Allocated block
    pub cidr: Ipv4Cidr,
    /// Subnet id
    pub subnet_id: Token,
    /// Route table id
    pub route_table_id: Token,
    /// Zone
    pub availability_zone: Token,
}

/// Handle to a declared VPC.
#[derive(Debug, Clone, PartialEq)]
pub struct Vpc {
    /// Construct path
    pub path: String,
    /// Logical id of the `AWS::EC2::VPC`
    pub logical_id: String,
    /// VPC id
    pub vpc_id: Token,
    /// `CidrBlock` attribute
    pub cidr_block: Token,
    /// Parsed block
    pub cidr: Ipv4Cidr,
    /// Zones in use
    pub availability_zones: Vec<Token>,
    /// Public subnets, all groups, zone-major within each group
    pub public_subnets: Vec<Subnet>,
    /// Private-with-egress subnets
    pub private_subnets: Vec<Subnet>,
    /// Isolated subnets
    pub isolated_subnets: Vec<Subnet>,
    /// Internet gateway id, when public subnets exist
    pub internet_gateway_id: Option<Token>,
    /// NAT gateway ids
    pub nat_gateway_ids: Vec<Token>,
    /// Gateway endpoints declared through [`VpcProps::gateway_endpoints`]
    pub gateway_endpoints: Vec<GatewayVpcEndpoint>,
}

impl Vpc {
    /// Declare a VPC and its subnets.
    pub fn new(stack: &mut Stack, id: &str, props: VpcProps) -> Result<Self> {
        let cidr: Ipv4Cidr = props.cidr.parse()?;
        let zones = Self::resolve_zones(id, &props)?;
        let nat_count = Self::validate(id, &props, &cidr, zones.len())?;

        let name_tag = format!("{}/{}", stack.name(), id);
        let vpc_resource = Resource::new("AWS::EC2::VPC")
            .property("CidrBlock", cidr.to_string())
            .property("EnableDnsHostnames", props.enable_dns_hostnames)
            .property("EnableDnsSupport", props.enable_dns_support)
            .property("InstanceTenancy", "default")
            .property("Tags", json!([{"Key": "Name", "Value": name_tag}]));
        let logical_id = stack.add_resource(&format!("{}/Resource", id), vpc_resource)?;
        let vpc_id = Token::reference(&logical_id);

        let mut vpc = Vpc {
            path: id.to_string(),
            cidr_block: Token::get_att(&logical_id, "CidrBlock"),
            logical_id,
            vpc_id,
            cidr,
            availability_zones: zones,
            public_subnets: Vec::new(),
            private_subnets: Vec::new(),
            isolated_subnets: Vec::new(),
            internet_gateway_id: None,
            nat_gateway_ids: Vec::new(),
            gateway_endpoints: Vec::new(),
        };

        vpc.create_subnets(stack, &props)?;

        let mut attachment_id = None;
        if !vpc.public_subnets.is_empty() {
            let igw = stack.add_resource(
                &format!("{}/IGW", id),
                Resource::new("AWS::EC2::InternetGateway")
                    .property("Tags", json!([{"Key": "Name", "Value": name_tag}])),
            )?;
            let attachment = stack.add_resource(
                &format!("{}/VPCGW", id),
                Resource::new("AWS::EC2::VPCGatewayAttachment")
                    .property("InternetGatewayId", Token::reference(&igw))
                    .property("VpcId", vpc.vpc_id.clone()),
            )?;
            vpc.internet_gateway_id = Some(Token::reference(&igw));
            attachment_id = Some(attachment);
        }

        let mut public_route_ids = Vec::with_capacity(vpc.public_subnets.len());
        for subnet in &vpc.public_subnets {
            let (Some(igw), Some(attachment)) = (&vpc.internet_gateway_id, &attachment_id) else {
                break;
            };
            let route = stack.add_resource(
                &format!("{}/DefaultRoute", subnet.path),
                Resource::new("AWS::EC2::Route")
                    .property("DestinationCidrBlock", "0.0.0.0/0")
                    .property("GatewayId", igw.clone())
                    .property("RouteTableId", subnet.route_table_id.clone())
                    .depends_on(attachment.clone()),
            )?;
            public_route_ids.push(route);
        }

        for (index, subnet) in vpc.public_subnets.iter().take(nat_count).enumerate() {
            let subnet_tag = json!([{"Key": "Name", "Value": format!("{}/{}", stack.name(), subnet.path)}]);
            let eip = stack.add_resource(
                &format!("{}/EIP", subnet.path),
                Resource::new("AWS::EC2::EIP")
                    .property("Domain", "vpc")
                    .property("Tags", subnet_tag.clone()),
            )?;
            let association = stack
                .logical_id_at(&format!("{}/RouteTableAssociation", subnet.path))
                .map(str::to_string)
                .ok_or_else(|| Error::validation(&subnet.path, "route table association missing"))?;
            let nat = stack.add_resource(
                &format!("{}/NATGateway", subnet.path),
                Resource::new("AWS::EC2::NatGateway")
                    .property("AllocationId", Token::get_att(&eip, "AllocationId"))
                    .property("SubnetId", subnet.subnet_id.clone())
                    .property("Tags", subnet_tag)
                    .depends_on(public_route_ids[index].clone())
                    .depends_on(association),
            )?;
            vpc.nat_gateway_ids.push(Token::reference(&nat));
        }

        // Subnets are declared zone by zone within each group, so the zone
        // index is the position modulo the zone count.
        let zones = vpc.availability_zones.len().max(1);
        for (index, subnet) in vpc.private_subnets.iter().enumerate() {
            let nat = vpc
                .nat_gateway_ids
                .get(index % zones)
                .or_else(|| vpc.nat_gateway_ids.first())
                .cloned()
                .ok_or_else(|| {
                    Error::validation(&vpc.path, "private subnets with egress need a NAT gateway")
                })?;
            stack.add_resource(
                &format!("{}/DefaultRoute", subnet.path),
                Resource::new("AWS::EC2::Route")
                    .property("DestinationCidrBlock", "0.0.0.0/0")
                    .property("NatGatewayId", nat)
                    .property("RouteTableId", subnet.route_table_id.clone()),
            )?;
        }

        for (endpoint_id, options) in &props.gateway_endpoints {
            let endpoint = vpc.add_gateway_endpoint(stack, endpoint_id, options.clone())?;
            vpc.gateway_endpoints.push(endpoint);
        }

        debug!(
            vpc = %vpc.path,
            zones = vpc.availability_zones.len(),
            public = vpc.public_subnets.len(),
            private = vpc.private_subnets.len(),
            isolated = vpc.isolated_subnets.len(),
            nat_gateways = vpc.nat_gateway_ids.len(),
            "Declared VPC"
        );

        Ok(vpc)
    }

    fn resolve_zones(id: &str, props: &VpcProps) -> Result<Vec<Token>> {
        if props.max_azs == 0 {
            return Err(Error::validation(id, "max_azs must be at least 1"));
        }
        if props.availability_zones.is_empty() {
            let all_zones = Token::get_azs(Token::literal(""));
            return Ok((0..props.max_azs)
                .map(|i| Token::select(i, all_zones.clone()))
                .collect());
        }
        Ok(props
            .availability_zones
            .iter()
            .take(props.max_azs)
            .map(|z| Token::literal(z.clone()))
            .collect())
    }

    /// Check the subnet layout and return the number of NAT gateways.
    fn validate(id: &str, props: &VpcProps, cidr: &Ipv4Cidr, zones: usize) -> Result<usize> {
        if cidr.prefix() < MIN_VPC_MASK || cidr.prefix() > MAX_SUBNET_MASK {
            return Err(Error::validation(
                id,
                format!(
                    "VPC block {} must have a prefix between /{} and /{}",
                    cidr, MIN_VPC_MASK, MAX_SUBNET_MASK
                ),
            ));
        }
        if props.subnet_configuration.is_empty() {
            return Err(Error::validation(id, "at least one subnet group is required"));
        }

        let mut names = std::collections::HashSet::new();
        for group in &props.subnet_configuration {
            if group.name.is_empty() {
                return Err(Error::validation(id, "subnet group names must not be empty"));
            }
            if !names.insert(group.name.as_str()) {
                return Err(Error::validation(
                    id,
                    format!("subnet group name '{}' is used twice", group.name),
                ));
            }
            if let Some(mask) = group.cidr_mask {
                if mask < cidr.prefix() || mask > MAX_SUBNET_MASK {
                    return Err(Error::validation(
                        id,
                        format!(
                            "cidr_mask /{} of group '{}' must be between /{} and /{}",
                            mask,
                            group.name,
                            cidr.prefix(),
                            MAX_SUBNET_MASK
                        ),
                    ));
                }
            }
        }

        let has = |t: SubnetType| props.subnet_configuration.iter().any(|g| g.subnet_type == t);
        let nat_count = if has(SubnetType::PrivateWithEgress) {
            props.nat_gateways.unwrap_or(zones)
        } else {
            props.nat_gateways.unwrap_or(0)
        };

        if has(SubnetType::PrivateWithEgress) && nat_count == 0 {
            return Err(Error::validation(
                id,
                "private subnets with egress need at least one NAT gateway",
            ));
        }
        if nat_count > 0 && !has(SubnetType::Public) {
            return Err(Error::validation(
                id,
                "NAT gateways need a public subnet group to live in",
            ));
        }
        if nat_count > zones {
            return Err(Error::validation(
                id,
                format!(
                    "{} NAT gateways requested but only {} availability zones are used",
                    nat_count, zones
                ),
            ));
        }

        Ok(nat_count)
    }

    fn create_subnets(&mut self, stack: &mut Stack, props: &VpcProps) -> Result<()> {
        let zones = self.availability_zones.len() as u64;
        let explicit_space: u64 = props
            .subnet_configuration
            .iter()
            .filter_map(|g| g.cidr_mask)
            .map(|mask| zones * (1u64 << (32 - u32::from(mask))))
            .sum();
        let unmasked_groups = props
            .subnet_configuration
            .iter()
            .filter(|g| g.cidr_mask.is_none())
            .count() as u64;

        let remaining_mask = if unmasked_groups > 0 {
            let space = self.cidr.size().checked_sub(explicit_space).ok_or_else(|| {
                Error::validation(&self.path, "explicit subnet masks exceed the VPC block")
            })?;
            let mask = mask_for_space(space, unmasked_groups * zones)
                .filter(|m| *m <= MAX_SUBNET_MASK)
                .ok_or_else(|| {
                    Error::validation(
                        &self.path,
                        format!("not enough space left in {} for the remaining subnets", self.cidr),
                    )
                })?;
            Some(mask.max(self.cidr.prefix()))
        } else {
            None
        };

        let mut allocator = CidrAllocator::new(self.cidr);
        for group in &props.subnet_configuration {
            let mask = group.cidr_mask.or(remaining_mask).ok_or_else(|| {
                Error::validation(&self.path, format!("group '{}' has no cidr mask", group.name))
            })?;
            for (index, zone) in self.availability_zones.clone().into_iter().enumerate() {
                let block = allocator.allocate(mask).map_err(|e| {
                    Error::validation(&self.path, format!("group '{}': {}", group.name, e))
                })?;
                let subnet = self.create_subnet(stack, group, index, zone, block)?;
                match group.subnet_type {
                    SubnetType::Public => self.public_subnets.push(subnet),
                    SubnetType::PrivateWithEgress => self.private_subnets.push(subnet),
                    SubnetType::PrivateIsolated => self.isolated_subnets.push(subnet),
                }
            }
        }
        Ok(())
    }

    fn create_subnet(
        &self,
        stack: &mut Stack,
        group: &SubnetConfiguration,
        index: usize,
        zone: Token,
        block: Ipv4Cidr,
    ) -> Result<Subnet> {
        let path = format!("{}/{}Subnet{}", self.path, group.name, index + 1);
        let name_tag = format!("{}/{}", stack.name(), path);

        let subnet_resource = Resource::new("AWS::EC2::Subnet")
            .property("AvailabilityZone", zone.clone())
            .property("CidrBlock", block.to_string())
            .property(
                "MapPublicIpOnLaunch",
                group.subnet_type == SubnetType::Public,
            )
            .property(
                "Tags",
                json!([
                    {"Key": "aws-cdk:subnet-name", "Value": group.name},
                    {"Key": "aws-cdk:subnet-type", "Value": group.subnet_type.label()},
                    {"Key": "Name", "Value": name_tag}
                ]),
            )
            .property("VpcId", self.vpc_id.clone());
        let logical_id = stack.add_resource(&format!("{}/Subnet", path), subnet_resource)?;
        let subnet_id = Token::reference(&logical_id);

        let route_table = stack.add_resource(
            &format!("{}/RouteTable", path),
            Resource::new("AWS::EC2::RouteTable")
                .property("Tags", json!([{"Key": "Name", "Value": name_tag}]))
                .property("VpcId", self.vpc_id.clone()),
        )?;
        let route_table_id = Token::reference(&route_table);

        stack.add_resource(
            &format!("{}/RouteTableAssociation", path),
            Resource::new("AWS::EC2::SubnetRouteTableAssociation")
                .property("RouteTableId", route_table_id.clone())
                .property("SubnetId", subnet_id.clone()),
        )?;

        Ok(Subnet {
            path,
            logical_id,
            group_name: group.name.clone(),
            subnet_type: group.subnet_type,
            cidr: block,
            subnet_id,
            route_table_id,
            availability_zone: zone,
        })
    }

    /// All subnets, public first.
    pub fn all_subnets(&self) -> impl Iterator<Item = &Subnet> {
        self.public_subnets
            .iter()
            .chain(self.private_subnets.iter())
            .chain(self.isolated_subnets.iter())
    }

    /// Subnets of a kind; with `None`, the most private kind available.
    pub fn select_subnets(&self, subnet_type: Option<SubnetType>) -> Result<&[Subnet]> {
        let selected: &[Subnet] = match subnet_type {
            Some(SubnetType::Public) => &self.public_subnets,
            Some(SubnetType::PrivateWithEgress) => &self.private_subnets,
            Some(SubnetType::PrivateIsolated) => &self.isolated_subnets,
            None if !self.private_subnets.is_empty() => &self.private_subnets,
            None if !self.isolated_subnets.is_empty() => &self.isolated_subnets,
            None => &self.public_subnets,
        };
        if selected.is_empty() {
            return Err(Error::validation(
                &self.path,
                format!(
                    "no {} subnets to select",
                    subnet_type.map(|t| t.label()).unwrap_or("usable")
                ),
            ));
        }
        Ok(selected)
    }

    /// Comma-joined ids of a subnet list, for outputs.
    pub fn joined_subnet_ids(subnets: &[Subnet]) -> Token {
        Token::join(",", subnets.iter().map(|s| s.subnet_id.clone()).collect())
    }

    /// Comma-joined zone names, for outputs.
    pub fn joined_availability_zones(&self) -> Token {
        Token::join(",", self.availability_zones.clone())
    }

    /// Add an interface endpoint in this VPC.
    pub fn add_interface_endpoint(
        &self,
        stack: &mut Stack,
        id: &str,
        props: InterfaceEndpointProps,
    ) -> Result<InterfaceVpcEndpoint> {
        InterfaceVpcEndpoint::new(stack, &format!("{}/{}", self.path, id), self, props)
    }

    /// Add a gateway endpoint in this VPC.
    pub fn add_gateway_endpoint(
        &self,
        stack: &mut Stack,
        id: &str,
        options: GatewayEndpointOptions,
    ) -> Result<GatewayVpcEndpoint> {
        GatewayVpcEndpoint::new(stack, &format!("{}/{}", self.path, id), self, options)
    }
}
