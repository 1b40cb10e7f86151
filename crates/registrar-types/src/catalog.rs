//! Read-only university/department catalog.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct University {
	pub id: u64,
	pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
	pub id: u64,
	pub university_id: u64,
	pub name: String,
	/// Registration fee in birr.
	#[serde(default)]
	pub price_birr: u64,
}

/// Catalog of registrable universities and their departments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
	#[serde(default)]
	pub universities: Vec<University>,
	#[serde(default)]
	pub departments: Vec<Department>,
}

impl Catalog {
	pub fn university(&self, id: u64) -> Option<&University> {
		self.universities.iter().find(|u| u.id == id)
	}

	pub fn department(&self, id: u64) -> Option<&Department> {
		self.departments.iter().find(|d| d.id == id)
	}

	/// Departments offered by the given university.
	pub fn departments_for(&self, university_id: u64) -> Vec<&Department> {
		self.departments
			.iter()
			.filter(|d| d.university_id == university_id)
			.collect()
	}

	/// Returns true if the department exists and belongs to the university.
	pub fn is_valid_selection(&self, university_id: u64, department_id: u64) -> bool {
		self.university(university_id).is_some()
			&& self
				.department(department_id)
				.is_some_and(|d| d.university_id == university_id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn catalog() -> Catalog {
		Catalog {
			universities: vec![
				University {
					id: 3,
					name: "North".into(),
				},
				University {
					id: 4,
					name: "South".into(),
				},
			],
			departments: vec![
				Department {
					id: 7,
					university_id: 3,
					name: "Software".into(),
					price_birr: 500,
				},
				Department {
					id: 8,
					university_id: 4,
					name: "Law".into(),
					price_birr: 300,
				},
			],
		}
	}

	#[test]
	fn test_departments_filtered_by_university() {
		let catalog = catalog();
		let north: Vec<u64> = catalog.departments_for(3).iter().map(|d| d.id).collect();
		assert_eq!(north, vec![7]);
		assert!(catalog.departments_for(99).is_empty());
	}

	#[test]
	fn test_selection_must_match_university() {
		let catalog = catalog();
		assert!(catalog.is_valid_selection(3, 7));
		assert!(!catalog.is_valid_selection(3, 8));
		assert!(!catalog.is_valid_selection(5, 7));
	}
}
