//! Networking: VPCs, subnets, security groups and endpoints.

pub mod cidr;
pub mod endpoint;
pub mod instance_type;
pub mod security_group;
pub mod vpc;

pub use cidr::{CidrAllocator, Ipv4Cidr};
pub use endpoint::{
    EndpointService, GatewayEndpointOptions, GatewayVpcEndpoint, InterfaceEndpointProps,
    InterfaceVpcEndpoint,
};
pub use instance_type::{InstanceClass, InstanceSize, InstanceType};
pub use security_group::{Peer, Port, Protocol, SecurityGroup, SecurityGroupProps};
pub use vpc::{Subnet, SubnetConfiguration, SubnetType, Vpc, VpcProps};
