//! Validation of backend configuration tables.
//!
//! Each pluggable backend (storage, blob, identity) receives its own raw TOML
//! table. Backends describe the table they accept as a [`Schema`] and their
//! factories reject malformed tables before anything is constructed.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: &'static str,
		actual: String,
	},
	#[error("Unknown field: {0}")]
	UnknownField(String),
}

/// Expected type of a configuration field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
	String,
	/// Integer with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
}

type Check = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

struct Field {
	name: String,
	field_type: FieldType,
	required: bool,
	check: Option<Check>,
}

/// Shape of a backend configuration table.
///
/// Built with [`Schema::new`] followed by `required`/`optional` calls. Fields
/// not declared in the schema are rejected so that typos surface at startup.
#[derive(Default)]
pub struct Schema {
	fields: Vec<Field>,
}

impl std::fmt::Debug for Schema {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_list()
			.entries(self.fields.iter().map(|field| (&field.name, field.required)))
			.finish()
	}
}

impl Schema {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn required(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
		self.fields.push(Field {
			name: name.into(),
			field_type,
			required: true,
			check: None,
		});
		self
	}

	pub fn optional(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
		self.fields.push(Field {
			name: name.into(),
			field_type,
			required: false,
			check: None,
		});
		self
	}

	/// Attaches an extra check to the most recently declared field.
	pub fn check<F>(mut self, check: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		if let Some(field) = self.fields.last_mut() {
			field.check = Some(Box::new(check));
		}
		self
	}

	pub fn validate(&self, config: &toml::Value) -> Result<(), SchemaError> {
		let table = config.as_table().ok_or_else(|| SchemaError::TypeMismatch {
			field: "root".to_string(),
			expected: "table",
			actual: config.type_str().to_string(),
		})?;

		if let Some(unknown) = table
			.keys()
			.find(|key| !self.fields.iter().any(|f| &f.name == *key))
		{
			return Err(SchemaError::UnknownField(unknown.clone()));
		}

		for field in &self.fields {
			let Some(value) = table.get(&field.name) else {
				if field.required {
					return Err(SchemaError::MissingField(field.name.clone()));
				}
				continue;
			};

			check_type(&field.name, value, &field.field_type)?;

			if let Some(check) = &field.check {
				check(value).map_err(|message| SchemaError::InvalidValue {
					field: field.name.clone(),
					message,
				})?;
			}
		}

		Ok(())
	}
}

fn check_type(name: &str, value: &toml::Value, expected: &FieldType) -> Result<(), SchemaError> {
	let mismatch = |expected: &'static str| SchemaError::TypeMismatch {
		field: name.to_string(),
		expected,
		actual: value.type_str().to_string(),
	};

	match expected {
		FieldType::String if !value.is_str() => Err(mismatch("string")),
		FieldType::Boolean if !value.is_bool() => Err(mismatch("boolean")),
		FieldType::Integer { min, max } => {
			let int = value.as_integer().ok_or_else(|| mismatch("integer"))?;
			if let Some(min) = min.filter(|min| int < *min) {
				return Err(SchemaError::InvalidValue {
					field: name.to_string(),
					message: format!("Value {} is less than minimum {}", int, min),
				});
			}
			if let Some(max) = max.filter(|max| int > *max) {
				return Err(SchemaError::InvalidValue {
					field: name.to_string(),
					message: format!("Value {} is greater than maximum {}", int, max),
				});
			}
			Ok(())
		},
		_ => Ok(()),
	}
}

/// Implemented by backends to describe the configuration they accept.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), SchemaError>;
}
