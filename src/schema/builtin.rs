//! Contracts for the tables the foundation database is built from.

use once_cell::sync::Lazy;

use super::{ColumnContract as Col, TableContract};
use crate::types::LogicalType::{Boolean, Float, Integer, Text};

static BUILTIN_CONTRACTS: Lazy<Vec<TableContract>> = Lazy::new(|| {
    vec![
        psgc(),
        enrollment(),
        school_year_meta(),
        school_levels(),
        meta_psgc(),
        address(),
        geo(),
        region_names(),
        school_sizes(),
        school_grades(),
        school_epochs(),
    ]
});

/// Every built-in contract, in registration order.
pub fn builtin_contracts() -> &'static [TableContract] {
    &BUILTIN_CONTRACTS
}

fn psgc() -> TableContract {
    TableContract::new(
        "psgc",
        vec![
            Col::required("id", Text).describe("10-digit Philippine Standard Geographic Code"),
            Col::new("name", Text),
            Col::new("cc", Text),
            Col::new("geo", Text).describe("geographic level (Reg, Prov, City, Mun, Bgy, ...)"),
            Col::new("old_names", Text),
            Col::new("city_class", Text),
            Col::new("income_class", Text),
            Col::new("urban_rural", Text),
            Col::new("2024_pop", Text),
            Col::new("status", Text),
        ],
    )
    .with_primary_key(["id"])
}

fn enrollment() -> TableContract {
    TableContract::new(
        "enrollment",
        vec![
            Col::required("school_year", Text),
            Col::required("school_id", Text),
            Col::new("grade", Text),
            Col::new("sex", Text),
            Col::new("strand", Text),
            Col::new("num_students", Integer),
        ],
    )
    .with_primary_key(["school_year", "school_id", "grade", "sex", "strand"])
}

fn school_year_meta() -> TableContract {
    TableContract::new(
        "school_year_meta",
        vec![
            Col::required("school_year", Text),
            Col::required("school_id", Text),
            Col::new("school_name", Text),
            Col::new("sector", Text),
            Col::new("school_management", Text),
            Col::new("annex_status", Text),
            Col::new("region", Text),
            Col::new("province", Text),
            Col::new("municipality", Text),
            Col::new("barangay", Text),
            Col::new("street_address", Text),
            Col::new("legislative_district", Text),
            Col::new("division", Text),
            Col::new("school_district", Text),
        ],
    )
    .with_primary_key(["school_year", "school_id"])
}

fn school_levels() -> TableContract {
    TableContract::new(
        "school_levels",
        vec![
            Col::required("school_id", Text),
            Col::required("school_year", Text),
            Col::required("level", Text),
            Col::new("offered", Boolean),
        ],
    )
    .with_primary_key(["school_id", "school_year", "level"])
}

fn meta_psgc() -> TableContract {
    TableContract::new(
        "meta_psgc",
        vec![
            Col::required("school_year", Text),
            Col::required("school_id", Text),
            Col::new("psgc_region_id", Text),
            Col::new("psgc_provhuc_id", Text),
            Col::new("psgc_muni_id", Text),
            Col::new("psgc_brgy_id", Text),
            Col::new("division", Text),
            Col::new("division_id", Text),
            Col::new("school_name", Text),
            Col::new("province", Text),
            Col::new("municipality", Text),
            Col::new("barangay", Text),
        ],
    )
    .with_primary_key(["school_id", "school_year"])
}

fn address() -> TableContract {
    TableContract::new(
        "address",
        vec![
            Col::required("school_id", Text),
            Col::required("school_year", Text),
            Col::required("_addr_hash", Integer),
            Col::required("address_id", Integer),
        ],
    )
    .with_primary_key(["address_id"])
}

fn geo() -> TableContract {
    TableContract::new(
        "geo",
        vec![
            Col::required("school_id", Text),
            Col::required("school_year", Text),
            Col::new("_addr_hash", Integer),
            Col::new("address_id", Integer),
            Col::new("longitude", Float),
            Col::new("latitude", Float),
            Col::new("psgc_region_id", Text),
            Col::new("psgc_provhuc_id", Text),
            Col::new("psgc_muni_id", Text),
            Col::new("psgc_brgy_id", Text),
        ],
    )
    .with_primary_key(["school_id", "school_year"])
}

fn region_names() -> TableContract {
    TableContract::new(
        "region_names",
        vec![
            Col::required("psgc_region_id", Text),
            Col::new("roman", Text),
            Col::new("location", Text),
            Col::new("common", Text),
            Col::new("other", Text),
        ],
    )
    .with_primary_key(["psgc_region_id"])
}

// Small reference tables that usually live together in one generics file.

fn school_sizes() -> TableContract {
    TableContract::new(
        "school_sizes",
        vec![
            Col::required("id", Integer),
            Col::required("label", Text),
            Col::new("shorthand", Text),
            Col::new("minimum", Integer).describe("inclusive lower bound on enrollment"),
            Col::new("maximum", Integer),
        ],
    )
    .with_primary_key(["id"])
}

fn school_grades() -> TableContract {
    TableContract::new(
        "school_grades",
        vec![
            Col::required("label", Text),
            Col::new("key_stage", Integer),
        ],
    )
    .with_primary_key(["label"])
}

fn school_epochs() -> TableContract {
    TableContract::new(
        "school_epochs",
        vec![Col::required("id", Integer), Col::required("label", Text)],
    )
    .with_primary_key(["id"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_passes_its_own_checks() {
        for contract in builtin_contracts() {
            contract.check().unwrap();
        }
    }

    #[test]
    fn enrollment_counts_are_integers() {
        let enrollment = builtin_contracts()
            .iter()
            .find(|c| c.table_name == "enrollment")
            .unwrap();
        assert_eq!(
            enrollment.column("num_students").unwrap().logical_type,
            Integer
        );
    }

    #[test]
    fn generic_reference_tables_are_registered() {
        let names: Vec<&str> = builtin_contracts().iter().map(|c| c.table_name.as_str()).collect();
        for table in ["school_sizes", "school_grades", "school_epochs"] {
            assert!(names.contains(&table), "{table} missing from {names:?}");
        }
        let grades = builtin_contracts()
            .iter()
            .find(|c| c.table_name == "school_grades")
            .unwrap();
        assert_eq!(grades.primary_key, vec!["label".to_string()]);
    }
}
