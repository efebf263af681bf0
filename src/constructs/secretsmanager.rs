//! Generated secrets and their attachment to a database.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::stack::Stack;
use crate::template::{DeletionPolicy, Resource, Token};

/// Field of a generated credentials secret holding the username.
pub const USERNAME_FIELD: &str = "username";

/// How the secret string is generated.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretStringGenerator {
    /// Fixed fields of the JSON secret, e.g. `{"username": "postgresadmin"}`
    pub secret_string_template: Map<String, Value>,
    /// Field the generated password is stored under
    pub generate_string_key: String,
    /// Leave punctuation out of the generated value
    pub exclude_punctuation: bool,
    /// Further characters to leave out
    pub exclude_characters: Option<String>,
    /// Generated length; `None` leaves the service default
    pub password_length: Option<u32>,
}

impl SecretStringGenerator {
    /// A `{"username": ..., "<key>": <generated>}` generator.
    pub fn for_username(username: &str, generate_string_key: impl Into<String>) -> Self {
        let mut template = Map::new();
        template.insert(USERNAME_FIELD.into(), json!(username));
        Self {
            secret_string_template: template,
            generate_string_key: generate_string_key.into(),
            exclude_punctuation: false,
            exclude_characters: None,
            password_length: None,
        }
    }

    fn to_value(&self) -> Result<Value> {
        let mut value = Map::new();
        if let Some(chars) = &self.exclude_characters {
            value.insert("ExcludeCharacters".into(), json!(chars));
        }
        if self.exclude_punctuation {
            value.insert("ExcludePunctuation".into(), json!(true));
        }
        value.insert("GenerateStringKey".into(), json!(self.generate_string_key));
        if let Some(length) = self.password_length {
            value.insert("PasswordLength".into(), json!(length));
        }
        value.insert(
            "SecretStringTemplate".into(),
            json!(serde_json::to_string(&self.secret_string_template)?),
        );
        Ok(Value::Object(value))
    }
}

/// Properties for [`Secret::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct SecretProps {
    /// Generation rules
    pub generate_secret_string: SecretStringGenerator,
    /// Optional description
    pub description: Option<String>,
}

/// Handle to a declared secret.
#[derive(Debug, Clone, PartialEq)]
pub struct Secret {
    /// Construct path
    pub path: String,
    /// Logical id of the `AWS::SecretsManager::Secret`
    pub logical_id: String,
    /// Secret ARN (what `Ref` returns)
    pub secret_arn: Token,
    generate_string_key: String,
    template_fields: Vec<String>,
}

impl Secret {
    /// Declare a secret at `<id>/Resource`.
    pub fn new(stack: &mut Stack, id: &str, props: SecretProps) -> Result<Self> {
        let generator = &props.generate_secret_string;
        if generator.generate_string_key.is_empty() {
            return Err(Error::validation(id, "generate_string_key must not be empty"));
        }
        if generator
            .secret_string_template
            .contains_key(&generator.generate_string_key)
        {
            return Err(Error::validation(
                id,
                format!(
                    "'{}' is both generated and fixed in the secret template",
                    generator.generate_string_key
                ),
            ));
        }

        let resource = Resource::new("AWS::SecretsManager::Secret")
            .optional_property("Description", props.description.clone())
            .property("GenerateSecretString", generator.to_value()?)
            .with_policies(DeletionPolicy::Delete);
        let logical_id = stack.add_resource(&format!("{}/Resource", id), resource)?;

        Ok(Self {
            path: id.to_string(),
            secret_arn: Token::reference(&logical_id),
            logical_id,
            generate_string_key: generator.generate_string_key.clone(),
            template_fields: generator.secret_string_template.keys().cloned().collect(),
        })
    }

    /// Deploy-time dynamic reference to one field of the JSON secret.
    pub fn secret_value_from_json(&self, field: &str) -> Result<Token> {
        if field != self.generate_string_key && !self.template_fields.iter().any(|f| f == field) {
            return Err(Error::validation(
                &self.path,
                format!("secret has no field '{}'", field),
            ));
        }
        Ok(Token::join(
            "",
            vec![
                Token::literal("{{resolve:secretsmanager:"),
                self.secret_arn.clone(),
                Token::literal(format!(":SecretString:{}::}}}}", field)),
            ],
        ))
    }

    /// Attach the secret to a database instance so rotation and the
    /// connection fields (`host`, `port`, ...) are filled in.
    pub fn attach(&self, stack: &mut Stack, target: &Token, target_type: &str) -> Result<Token> {
        let resource = Resource::new("AWS::SecretsManager::SecretTargetAttachment")
            .property("SecretId", self.secret_arn.clone())
            .property("TargetId", target.clone())
            .property("TargetType", target_type);
        let logical_id = stack.add_resource(&format!("{}/Attachment/Resource", self.path), resource)?;
        debug!(secret = %self.path, target = %target, "Attached secret");
        Ok(Token::reference(logical_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Environment;

    fn db_secret(stack: &mut Stack) -> Secret {
        let mut generator = SecretStringGenerator::for_username("postgresadmin", "password");
        generator.exclude_punctuation = true;
        generator.exclude_characters = Some("\"@/".into());
        Secret::new(
            stack,
            "DBSecret",
            SecretProps {
                generate_secret_string: generator,
                description: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_generate_secret_string() {
        let mut stack = Stack::new("S", Environment::agnostic());
        let secret = db_secret(&mut stack);
        let resource = stack.resource(&secret.logical_id).unwrap();
        let generated = &resource.properties["GenerateSecretString"];
        assert_eq!(generated["GenerateStringKey"], json!("password"));
        assert_eq!(generated["ExcludePunctuation"], json!(true));
        assert_eq!(generated["ExcludeCharacters"], json!("\"@/"));
        assert_eq!(
            generated["SecretStringTemplate"],
            json!("{\"username\":\"postgresadmin\"}")
        );
    }

    #[test]
    fn test_secret_value_from_json() {
        let mut stack = Stack::new("S", Environment::agnostic());
        let secret = db_secret(&mut stack);
        let token = secret.secret_value_from_json("password").unwrap();
        assert_eq!(
            token.to_value(),
            json!({"Fn::Join": ["", [
                "{{resolve:secretsmanager:",
                {"Ref": secret.logical_id},
                ":SecretString:password::}}"
            ]]})
        );
        assert!(secret.secret_value_from_json("username").is_ok());
        assert!(secret.secret_value_from_json("host").is_err());
    }

    #[test]
    fn test_generated_key_cannot_be_fixed() {
        let mut stack = Stack::new("S", Environment::agnostic());
        let mut generator = SecretStringGenerator::for_username("admin", "password");
        generator
            .secret_string_template
            .insert("password".into(), json!("hunter2"));
        let err = Secret::new(
            &mut stack,
            "DBSecret",
            SecretProps {
                generate_secret_string: generator,
                description: None,
            },
        )
        .unwrap_err();
        assert!(err.is_user_error());
    }
}
