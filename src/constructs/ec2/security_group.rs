//! Security groups and their ingress/egress rules.
//!
//! Rules whose peer is a CIDR are rendered inline on the group. Rules whose
//! peer is another security group become standalone
//! `AWS::EC2::SecurityGroupIngress` / `AWS::EC2::SecurityGroupEgress`
//! resources, so two groups can reference each other without forming a
//! dependency cycle.

use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::naming;
use crate::stack::Stack;
use crate::template::{Resource, Token};

/// IP protocol of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// TCP
    Tcp,
    /// UDP
    Udp,
    /// All protocols (`-1`)
    All,
}

impl Protocol {
    /// Wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::All => "-1",
        }
    }
}

/// A protocol and port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port {
    /// Protocol
    pub protocol: Protocol,
    /// Start of port range
    pub from_port: u16,
    /// End of port range
    pub to_port: u16,
}

impl Port {
    /// A single TCP port.
    pub fn tcp(port: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            from_port: port,
            to_port: port,
        }
    }

    /// A TCP port range.
    pub fn tcp_range(from_port: u16, to_port: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            from_port,
            to_port,
        }
    }

    /// All TCP ports.
    pub fn all_tcp() -> Self {
        Self::tcp_range(0, 65535)
    }

    /// Any protocol, any port.
    pub fn all_traffic() -> Self {
        Self {
            protocol: Protocol::All,
            from_port: 0,
            to_port: 0,
        }
    }

    /// Label used in descriptions and construct ids (`5432`, `0-65535`, `ALL TRAFFIC`).
    pub fn label(&self) -> String {
        match self.protocol {
            Protocol::All => "ALL TRAFFIC".to_string(),
            _ if self.from_port == self.to_port => self.from_port.to_string(),
            _ => format!("{}-{}", self.from_port, self.to_port),
        }
    }

    fn apply(&self, rule: &mut Map<String, Value>) {
        rule.insert("IpProtocol".into(), json!(self.protocol.as_str()));
        if self.protocol != Protocol::All {
            rule.insert("FromPort".into(), json!(self.from_port));
            rule.insert("ToPort".into(), json!(self.to_port));
        }
    }
}

/// The other side of a rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Peer {
    /// An IPv4 range (literal or deploy-time, e.g. a VPC's `CidrBlock`)
    Ipv4(Token),
    /// Another security group
    SecurityGroup {
        /// Construct path of the group, used to name the rule
        path: String,
        /// Group id token
        group_id: Token,
    },
}

impl Peer {
    /// A literal IPv4 range.
    pub fn ipv4(cidr: impl Into<String>) -> Self {
        Peer::Ipv4(Token::literal(cidr))
    }

    /// `0.0.0.0/0`.
    pub fn any_ipv4() -> Self {
        Peer::ipv4("0.0.0.0/0")
    }

    /// Members of `group`.
    pub fn security_group(group: &SecurityGroup) -> Self {
        Peer::SecurityGroup {
            path: group.path.clone(),
            group_id: group.group_id.clone(),
        }
    }

    /// Default rule description, e.g. `from 10.0.0.0/16:5432`. A
    /// deploy-time range renders as an `Fn::Join` around the range.
    fn rule_description(&self, direction: &str, port: &Port) -> Token {
        let peer = match self {
            Peer::Ipv4(cidr) => cidr.clone(),
            Peer::SecurityGroup { path, .. } => Token::literal(naming::unique_name(path)),
        };
        Token::join(
            "",
            vec![
                Token::literal(format!("{} ", direction)),
                peer,
                Token::literal(format!(":{}", port.label())),
            ],
        )
    }
}

/// Properties for [`SecurityGroup::new`].
#[derive(Debug, Clone)]
pub struct SecurityGroupProps {
    /// VPC id the group lives in
    pub vpc_id: Token,
    /// Group description; defaults to the construct path
    pub description: Option<String>,
    /// Emit the single allow-all egress rule
    pub allow_all_outbound: bool,
}

impl SecurityGroupProps {
    /// Props with defaults for a VPC.
    pub fn new(vpc_id: Token) -> Self {
        Self {
            vpc_id,
            description: None,
            allow_all_outbound: true,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Handle to a declared security group.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityGroup {
    /// Construct path
    pub path: String,
    /// Logical id of the `AWS::EC2::SecurityGroup`
    pub logical_id: String,
    /// `GroupId` attribute
    pub group_id: Token,
    allow_all_outbound: bool,
}

impl SecurityGroup {
    /// Declare a security group at `<id>/Resource`.
    pub fn new(stack: &mut Stack, id: &str, props: SecurityGroupProps) -> Result<Self> {
        let resource_path = format!("{}/Resource", id);
        let description = props
            .description
            .unwrap_or_else(|| format!("{}/{}", stack.name(), id));

        let egress = if props.allow_all_outbound {
            json!([{
                "CidrIp": "0.0.0.0/0",
                "Description": "Allow all outbound traffic by default",
                "IpProtocol": "-1"
            }])
        } else {
            json!([{
                "CidrIp": "255.255.255.255/32",
                "Description": "Disallow all traffic",
                "FromPort": 252,
                "IpProtocol": "icmp",
                "ToPort": 86
            }])
        };

        let resource = Resource::new("AWS::EC2::SecurityGroup")
            .property("GroupDescription", description)
            .property("SecurityGroupEgress", egress)
            .property("VpcId", props.vpc_id);
        let logical_id = stack.add_resource(&resource_path, resource)?;

        Ok(Self {
            path: id.to_string(),
            group_id: Token::get_att(&logical_id, "GroupId"),
            logical_id,
            allow_all_outbound: props.allow_all_outbound,
        })
    }

    /// Allow traffic from `peer` on `port`.
    pub fn add_ingress_rule(
        &self,
        stack: &mut Stack,
        peer: &Peer,
        port: Port,
        description: Option<&str>,
    ) -> Result<()> {
        let description = description
            .map(Token::literal)
            .unwrap_or_else(|| peer.rule_description("from", &port));

        match peer {
            Peer::Ipv4(cidr) => {
                let mut rule = Map::new();
                rule.insert("CidrIp".into(), cidr.to_value());
                rule.insert("Description".into(), description.to_value());
                port.apply(&mut rule);
                self.push_inline_rule(stack, "SecurityGroupIngress", Value::Object(rule))
            }
            Peer::SecurityGroup { path: peer_path, group_id } => {
                let path = format!(
                    "{}/from {}:{}",
                    self.path,
                    naming::unique_name(peer_path),
                    port.label()
                );
                let mut resource = Resource::new("AWS::EC2::SecurityGroupIngress")
                    .property("Description", description)
                    .property("GroupId", self.group_id.clone())
                    .property("SourceSecurityGroupId", group_id.clone());
                let mut ports = Map::new();
                port.apply(&mut ports);
                resource.properties.extend(ports);
                stack.add_resource(&path, resource)?;
                Ok(())
            }
        }
    }

    /// Allow traffic to `peer` on `port`.
    ///
    /// A no-op when the group already allows all outbound traffic.
    pub fn add_egress_rule(
        &self,
        stack: &mut Stack,
        peer: &Peer,
        port: Port,
        description: Option<&str>,
    ) -> Result<()> {
        if self.allow_all_outbound {
            return Ok(());
        }
        let description = description
            .map(Token::literal)
            .unwrap_or_else(|| peer.rule_description("to", &port));

        match peer {
            Peer::Ipv4(cidr) => {
                let mut rule = Map::new();
                rule.insert("CidrIp".into(), cidr.to_value());
                rule.insert("Description".into(), description.to_value());
                port.apply(&mut rule);
                self.replace_placeholder_egress(stack)?;
                self.push_inline_rule(stack, "SecurityGroupEgress", Value::Object(rule))
            }
            Peer::SecurityGroup { path: peer_path, group_id } => {
                let path = format!(
                    "{}/to {}:{}",
                    self.path,
                    naming::unique_name(peer_path),
                    port.label()
                );
                let mut resource = Resource::new("AWS::EC2::SecurityGroupEgress")
                    .property("Description", description)
                    .property("GroupId", self.group_id.clone())
                    .property("DestinationSecurityGroupId", group_id.clone());
                let mut ports = Map::new();
                port.apply(&mut ports);
                resource.properties.extend(ports);
                stack.add_resource(&path, resource)?;
                Ok(())
            }
        }
    }

    fn push_inline_rule(&self, stack: &mut Stack, key: &str, rule: Value) -> Result<()> {
        let resource = stack
            .resource_mut(&self.logical_id)
            .ok_or_else(|| Error::validation(&self.path, "security group is not declared"))?;
        let rules = resource
            .properties
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match rules {
            Value::Array(items) => {
                if !items.contains(&rule) {
                    items.push(rule);
                }
                Ok(())
            }
            _ => Err(Error::validation(&self.path, format!("{} is not a list", key))),
        }
    }

    fn replace_placeholder_egress(&self, stack: &mut Stack) -> Result<()> {
        let resource = stack
            .resource_mut(&self.logical_id)
            .ok_or_else(|| Error::validation(&self.path, "security group is not declared"))?;
        if let Some(Value::Array(items)) = resource.properties.get_mut("SecurityGroupEgress") {
            items.retain(|r| r.get("CidrIp") != Some(&json!("255.255.255.255/32")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Environment;

    fn stack() -> Stack {
        Stack::new("TestStack", Environment::agnostic())
    }

    #[test]
    fn test_allow_all_outbound() {
        let mut stack = stack();
        let sg = SecurityGroup::new(
            &mut stack,
            "Sg",
            SecurityGroupProps::new(Token::reference("Vpc")),
        )
        .unwrap();
        let resource = stack.resource(&sg.logical_id).unwrap();
        assert_eq!(
            resource.property_at("GroupDescription"),
            Some(&json!("TestStack/Sg"))
        );
        assert_eq!(
            resource.property_at("SecurityGroupEgress.0.IpProtocol"),
            Some(&json!("-1"))
        );
    }

    #[test]
    fn test_cidr_ingress_is_inline() {
        let mut stack = stack();
        let sg = SecurityGroup::new(
            &mut stack,
            "Sg",
            SecurityGroupProps::new(Token::reference("Vpc")),
        )
        .unwrap();
        sg.add_ingress_rule(&mut stack, &Peer::ipv4("10.0.0.0/16"), Port::tcp(5432), None)
            .unwrap();

        let resource = stack.resource(&sg.logical_id).unwrap();
        assert_eq!(
            resource.property_at("SecurityGroupIngress.0"),
            Some(&json!({
                "CidrIp": "10.0.0.0/16",
                "Description": "from 10.0.0.0/16:5432",
                "FromPort": 5432,
                "IpProtocol": "tcp",
                "ToPort": 5432
            }))
        );
        assert_eq!(stack.resource_count(), 1);
    }

    #[test]
    fn test_token_peer_description_is_joined() {
        let mut stack = stack();
        stack
            .add_resource("Vpc", Resource::new("AWS::EC2::VPC"))
            .unwrap();
        let sg = SecurityGroup::new(
            &mut stack,
            "Sg",
            SecurityGroupProps::new(Token::reference("Vpc")),
        )
        .unwrap();
        let cidr = Token::get_att("Vpc", "CidrBlock");
        sg.add_ingress_rule(&mut stack, &Peer::Ipv4(cidr), Port::tcp(443), None)
            .unwrap();

        let resource = stack.resource(&sg.logical_id).unwrap();
        assert_eq!(
            resource.property_at("SecurityGroupIngress.0.Description"),
            Some(&json!({"Fn::Join": ["", [
                "from ",
                {"Fn::GetAtt": ["Vpc", "CidrBlock"]},
                ":443"
            ]]}))
        );
        assert!(stack.synth().is_ok());
    }

    #[test]
    fn test_group_ingress_is_standalone() {
        let mut stack = stack();
        stack
            .add_resource("Vpc", Resource::new("AWS::EC2::VPC"))
            .unwrap();
        let db = SecurityGroup::new(&mut stack, "Db", SecurityGroupProps::new(Token::reference("Vpc")))
            .unwrap();
        let app = SecurityGroup::new(&mut stack, "App", SecurityGroupProps::new(Token::reference("Vpc")))
            .unwrap();
        db.add_ingress_rule(&mut stack, &Peer::security_group(&app), Port::tcp(5432), None)
            .unwrap();

        assert_eq!(stack.resource_count(), 4);
        let template = stack.synth().unwrap();
        let (_, ingress) = template
            .resources_of_type("AWS::EC2::SecurityGroupIngress")
            .next()
            .unwrap();
        assert_eq!(
            ingress.property_at("SourceSecurityGroupId"),
            Some(&app.group_id.to_value())
        );
    }

    #[test]
    fn test_restricted_egress() {
        let mut stack = stack();
        let mut props = SecurityGroupProps::new(Token::reference("Vpc"));
        props.allow_all_outbound = false;
        let sg = SecurityGroup::new(&mut stack, "Sg", props).unwrap();
        sg.add_egress_rule(&mut stack, &Peer::any_ipv4(), Port::tcp(443), Some("https"))
            .unwrap();

        let resource = stack.resource(&sg.logical_id).unwrap();
        let egress = resource.property_at("SecurityGroupEgress").unwrap();
        assert_eq!(egress.as_array().unwrap().len(), 1);
        assert_eq!(
            resource.property_at("SecurityGroupEgress.0.Description"),
            Some(&json!("https"))
        );
    }

    #[test]
    fn test_port_labels() {
        assert_eq!(Port::tcp(5432).label(), "5432");
        assert_eq!(Port::all_tcp().label(), "0-65535");
        assert_eq!(Port::all_traffic().label(), "ALL TRAFFIC");
    }
}
