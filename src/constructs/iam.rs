//! IAM roles and inline policies.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::stack::Stack;
use crate::template::{Resource, Token};

/// Policy language version used for every document.
pub const POLICY_VERSION: &str = "2012-10-17";

/// A service allowed to assume a role, e.g. `rds.amazonaws.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePrincipal(String);

impl ServicePrincipal {
    /// Principal for a service host name.
    pub fn new(service: impl Into<String>) -> Self {
        Self(service.into())
    }

    /// The service host name.
    pub fn service(&self) -> &str {
        &self.0
    }
}

/// Allow or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    /// Grant
    Allow,
    /// Refuse
    Deny,
}

/// One statement of a policy document.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    /// Allow or deny
    pub effect: Effect,
    /// Actions, e.g. `rds-db:connect`
    pub actions: Vec<String>,
    /// Resources the actions apply to
    pub resources: Vec<Token>,
}

impl PolicyStatement {
    /// An allow statement.
    pub fn allow<A, S>(actions: A, resources: Vec<Token>) -> Self
    where
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            effect: Effect::Allow,
            actions: actions.into_iter().map(Into::into).collect(),
            resources,
        }
    }

    /// Statement JSON. A single action or resource renders as a scalar.
    pub fn to_value(&self) -> Value {
        let actions = match self.actions.as_slice() {
            [single] => json!(single),
            many => json!(many),
        };
        let resources = match self.resources.as_slice() {
            [single] => single.to_value(),
            many => Value::Array(many.iter().map(Token::to_value).collect()),
        };
        json!({
            "Action": actions,
            "Effect": self.effect,
            "Resource": resources,
        })
    }
}

/// Properties for [`Role::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct RoleProps {
    /// Service allowed to assume the role
    pub assumed_by: ServicePrincipal,
    /// Optional description
    pub description: Option<String>,
}

impl RoleProps {
    /// A role assumable by `assumed_by`.
    pub fn new(assumed_by: ServicePrincipal) -> Self {
        Self {
            assumed_by,
            description: None,
        }
    }
}

/// Handle to a declared role.
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    /// Construct path
    pub path: String,
    /// Logical id of the `AWS::IAM::Role`
    pub logical_id: String,
    /// Role name
    pub role_name: Token,
    /// `Arn` attribute
    pub arn: Token,
    policy_logical_id: Option<String>,
}

impl Role {
    /// Declare a role at `<id>/Resource`.
    pub fn new(stack: &mut Stack, id: &str, props: RoleProps) -> Result<Self> {
        let trust = json!({
            "Statement": [{
                "Action": "sts:AssumeRole",
                "Effect": "Allow",
                "Principal": {"Service": props.assumed_by.service()}
            }],
            "Version": POLICY_VERSION
        });
        let resource = Resource::new("AWS::IAM::Role")
            .property("AssumeRolePolicyDocument", trust)
            .optional_property("Description", props.description);
        let logical_id = stack.add_resource(&format!("{}/Resource", id), resource)?;

        Ok(Self {
            path: id.to_string(),
            role_name: Token::reference(&logical_id),
            arn: Token::get_att(&logical_id, "Arn"),
            logical_id,
            policy_logical_id: None,
        })
    }

    /// Append a statement to the role's default policy, creating the
    /// policy on first use.
    pub fn add_to_policy(&mut self, stack: &mut Stack, statement: PolicyStatement) -> Result<()> {
        if statement.actions.is_empty() {
            return Err(Error::validation(&self.path, "policy statement has no actions"));
        }
        if statement.resources.is_empty() {
            return Err(Error::validation(&self.path, "policy statement has no resources"));
        }

        let policy_id = match &self.policy_logical_id {
            Some(id) => id.clone(),
            None => {
                let path = format!("{}/DefaultPolicy/Resource", self.path);
                let id = stack.add_resource(
                    &path,
                    Resource::new("AWS::IAM::Policy")
                        .property(
                            "PolicyDocument",
                            json!({"Statement": [], "Version": POLICY_VERSION}),
                        )
                        .property("Roles", json!([self.role_name.to_value()])),
                )?;
                if let Some(policy) = stack.resource_mut(&id) {
                    policy.properties.insert("PolicyName".into(), json!(id));
                }
                self.policy_logical_id = Some(id.clone());
                id
            }
        };

        let policy = stack
            .resource_mut(&policy_id)
            .ok_or_else(|| Error::validation(&self.path, "default policy is not declared"))?;
        let statements = policy
            .properties
            .get_mut("PolicyDocument")
            .and_then(|doc| doc.get_mut("Statement"))
            .and_then(Value::as_array_mut)
            .ok_or_else(|| Error::validation(&self.path, "default policy has no statement list"))?;
        statements.push(statement.to_value());

        debug!(role = %self.path, actions = ?statement.actions, "Added policy statement");
        Ok(())
    }

    /// Logical id of the default policy, once one exists.
    pub fn default_policy(&self) -> Option<&str> {
        self.policy_logical_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Environment;

    #[test]
    fn test_role_trust_policy() {
        let mut stack = Stack::new("S", Environment::agnostic());
        let role = Role::new(
            &mut stack,
            "RDSRole",
            RoleProps::new(ServicePrincipal::new("rds.amazonaws.com")),
        )
        .unwrap();
        let resource = stack.resource(&role.logical_id).unwrap();
        assert_eq!(
            resource.properties["AssumeRolePolicyDocument"]["Statement"][0]["Principal"],
            json!({"Service": "rds.amazonaws.com"})
        );
        assert!(role.default_policy().is_none());
    }

    #[test]
    fn test_add_to_policy_appends() {
        let mut stack = Stack::new("S", Environment::agnostic());
        let mut role = Role::new(
            &mut stack,
            "RDSRole",
            RoleProps::new(ServicePrincipal::new("rds.amazonaws.com")),
        )
        .unwrap();
        role.add_to_policy(
            &mut stack,
            PolicyStatement::allow(
                ["rds-db:connect", "secretsmanager:GetSecretValue", "sts:AssumeRole"],
                vec![Token::literal("*")],
            ),
        )
        .unwrap();
        role.add_to_policy(
            &mut stack,
            PolicyStatement::allow(["rds-db:connect"], vec![Token::literal("arn:x")]),
        )
        .unwrap();

        let policy_id = role.default_policy().unwrap().to_string();
        let policy = stack.resource(&policy_id).unwrap();
        assert_eq!(policy.properties["PolicyName"], json!(policy_id));
        let statements = policy.properties["PolicyDocument"]["Statement"]
            .as_array()
            .unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0]["Resource"], json!("*"));
        assert_eq!(statements[1]["Action"], json!("rds-db:connect"));
        assert!(stack.synth().is_ok());
    }

    #[test]
    fn test_empty_statement_rejected() {
        let mut stack = Stack::new("S", Environment::agnostic());
        let mut role = Role::new(
            &mut stack,
            "Role",
            RoleProps::new(ServicePrincipal::new("rds.amazonaws.com")),
        )
        .unwrap();
        let statement = PolicyStatement::allow(Vec::<String>::new(), vec![Token::literal("*")]);
        assert!(role.add_to_policy(&mut stack, statement).is_err());
    }
}
