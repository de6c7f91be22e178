//! Printer geometry and the geometry-aware view of a profile used for slicing.

use crate::defaults::ParamTable;
use crate::profile::Profile;
use crate::value::ParamValue;
use serde::{Deserialize, Serialize};

pub const PRINT_CENTER: &str = "print_center";
pub const NOZZLE_DIAMETER: &str = "nozzle_diameter";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BedShape {
    #[default]
    Rectangular,
    Circular,
}

/// The parts of a printer description slicing depends on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrinterGeometry {
    pub bed_width: f64,
    pub bed_depth: f64,
    #[serde(default)]
    pub bed_shape: BedShape,
    pub nozzle_diameter: f64,
}

impl Default for PrinterGeometry {
    fn default() -> Self {
        Self {
            bed_width: 200.0,
            bed_depth: 200.0,
            bed_shape: BedShape::Rectangular,
            nozzle_diameter: 0.4,
        }
    }
}

impl PrinterGeometry {
    /// Bed center for rectangular beds; circular beds are centered on the origin.
    pub fn bed_center(&self) -> (f64, f64) {
        match self.bed_shape {
            BedShape::Rectangular => (self.bed_width / 2.0, self.bed_depth / 2.0),
            BedShape::Circular => (0.0, 0.0),
        }
    }
}

/// Read-only view combining a profile with the printer it is sliced for.
///
/// `get` answers stored and geometry-derived parameters alike.
#[derive(Debug, Clone, Copy)]
pub struct SliceSettings<'a> {
    profile: &'a Profile,
    table: &'a ParamTable,
    geometry: PrinterGeometry,
    position: Option<(f64, f64)>,
}

impl<'a> SliceSettings<'a> {
    pub fn new(profile: &'a Profile, table: &'a ParamTable, geometry: PrinterGeometry) -> Self {
        Self {
            profile,
            table,
            geometry,
            position: None,
        }
    }

    /// Place the object at an explicit position instead of the bed center.
    #[must_use]
    pub fn with_position(mut self, position: Option<(f64, f64)>) -> Self {
        self.position = position;
        self
    }

    pub fn table(&self) -> &'a ParamTable {
        self.table
    }

    pub fn geometry(&self) -> &PrinterGeometry {
        &self.geometry
    }

    /// Explicit position, else the bed center. A stored `print_center` is
    /// ignored: placement belongs to the printer, not the profile.
    pub fn print_center(&self) -> (f64, f64) {
        self.position.unwrap_or_else(|| self.geometry.bed_center())
    }

    pub fn get(&self, name: &str) -> Option<ParamValue> {
        match name {
            PRINT_CENTER => {
                let (x, y) = self.print_center();
                Some(ParamValue::List(vec![
                    ParamValue::Float(x),
                    ParamValue::Float(y),
                ]))
            }
            NOZZLE_DIAMETER => Some(
                self.profile
                    .get(name)
                    .cloned()
                    .unwrap_or(ParamValue::Float(self.geometry.nozzle_diameter)),
            ),
            _ => self.profile.get(name).cloned().or_else(|| {
                self.table
                    .get(name)
                    .filter(|d| !d.derived)
                    .and_then(|d| d.default.clone())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(shape: BedShape) -> PrinterGeometry {
        PrinterGeometry {
            bed_width: 250.0,
            bed_depth: 210.0,
            bed_shape: shape,
            nozzle_diameter: 0.6,
        }
    }

    #[test]
    fn print_center_follows_bed() {
        let table = ParamTable::slic3r();
        let profile = Profile::defaults(table);
        let settings = SliceSettings::new(&profile, table, geometry(BedShape::Rectangular));
        assert_eq!(settings.print_center(), (125.0, 105.0));
        assert_eq!(
            settings.get(PRINT_CENTER),
            Some(ParamValue::List(vec![
                ParamValue::Float(125.0),
                ParamValue::Float(105.0)
            ]))
        );

        let round = SliceSettings::new(&profile, table, geometry(BedShape::Circular));
        assert_eq!(round.print_center(), (0.0, 0.0));
    }

    #[test]
    fn explicit_position_wins_over_bed_and_profile() {
        let table = ParamTable::slic3r();
        let profile = Profile::parse_str(table, "print_center = 10,10\n");
        let settings = SliceSettings::new(&profile, table, geometry(BedShape::Rectangular))
            .with_position(Some((42.0, 17.5)));
        assert_eq!(settings.print_center(), (42.0, 17.5));
    }

    #[test]
    fn nozzle_comes_from_geometry_unless_profile_sets_it() {
        let table = ParamTable::slic3r();
        let profile = Profile::defaults(table);
        let settings = SliceSettings::new(&profile, table, geometry(BedShape::Rectangular));
        assert_eq!(settings.get(NOZZLE_DIAMETER), Some(ParamValue::Float(0.6)));

        let profile = Profile::parse_str(table, "nozzle_diameter = 0.25\n");
        let settings = SliceSettings::new(&profile, table, geometry(BedShape::Rectangular));
        assert_eq!(settings.get(NOZZLE_DIAMETER), Some(ParamValue::Float(0.25)));
    }

    #[test]
    fn every_defaulted_parameter_resolves() {
        let table = ParamTable::slic3r();
        let profile = Profile::parse_str(table, "perimeters = 2\n");
        let settings = SliceSettings::new(&profile, table, PrinterGeometry::default());
        for def in table.iter().filter(|d| d.default.is_some()) {
            assert!(settings.get(&def.name).is_some(), "{} unresolved", def.name);
        }
        assert!(settings.get("start_gcode").is_none());
        assert!(settings.get("no_such_setting").is_none());
    }

    #[test]
    fn geometry_json_uses_lowercase_shape() {
        let json = serde_json::to_value(geometry(BedShape::Circular)).unwrap();
        assert_eq!(json["bed_shape"], "circular");
    }
}
