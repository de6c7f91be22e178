//! The parameter default table: every parameter this bridge knows, its declared
//! shape, and its default.

use crate::value::{ParamShape, ParamValue};
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub mod gcode_flavor {
    pub const REPRAP: &str = "reprap";
    pub const TEACUP: &str = "teacup";
    pub const MAKERWARE: &str = "makerware";
    pub const SAILFISH: &str = "sailfish";
    pub const MACH3: &str = "mach3";
    pub const NO_EXTRUSION: &str = "no-extrusion";
}

pub mod fill_pattern {
    pub const ARCHIMEDEAN_CHORDS: &str = "archimedeanchords";
    pub const RECTILINEAR: &str = "rectilinear";
    pub const FLOWSNAKE: &str = "flowsnake";
    pub const OCTAGRAM_SPIRAL: &str = "octagramspiral";
    pub const HILBERT_CURVE: &str = "hilbertcurve";
    pub const LINE: &str = "line";
    pub const CONCENTRIC: &str = "concentric";
    pub const HONEYCOMB: &str = "honeycomb";
    pub const HONEYCOMB_3D: &str = "3dhoneycomb";
}

pub mod support_pattern {
    pub const HONEYCOMB: &str = "honeycomb";
    pub const RECTILINEAR: &str = "rectilinear";
    pub const RECTILINEAR_GRID: &str = "rectilinear-grid";
}

pub mod seam_position {
    pub const RANDOM: &str = "random";
    pub const ALIGNED: &str = "aligned";
    pub const NEAREST: &str = "nearest";
}

/// Declaration of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    pub name: String,
    pub shape: ParamShape,
    /// `None` for parameters that only exist when a profile or override
    /// supplies them (custom G-code hooks).
    pub default: Option<ParamValue>,
    /// Derived parameters are resolved from the printer geometry at read time;
    /// their `default` only serves as the coercion reference.
    pub derived: bool,
}

impl ParamDef {
    pub fn new(name: impl Into<String>, shape: ParamShape, default: Option<ParamValue>) -> Self {
        Self {
            name: name.into(),
            shape,
            default,
            derived: false,
        }
    }

    /// Declare a parameter whose shape is the shape of its default.
    pub fn fixed(name: impl Into<String>, default: impl Into<ParamValue>) -> Self {
        let default = default.into();
        Self::new(name, ParamShape::of(&default), Some(default))
    }

    pub fn percent(name: impl Into<String>, default: impl Into<ParamValue>) -> Self {
        Self::new(name, ParamShape::PercentOrNumber, Some(default.into()))
    }

    pub fn unset(name: impl Into<String>, shape: ParamShape) -> Self {
        Self::new(name, shape, None)
    }

    #[must_use]
    pub fn derived(mut self) -> Self {
        self.derived = true;
        self
    }
}

/// Immutable lookup table of parameter declarations, keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamTable {
    defs: BTreeMap<String, ParamDef>,
}

impl ParamTable {
    pub fn new(defs: impl IntoIterator<Item = ParamDef>) -> Self {
        Self {
            defs: defs.into_iter().map(|d| (d.name.clone(), d)).collect(),
        }
    }

    /// The built-in Slic3r table, constructed once per process.
    pub fn slic3r() -> &'static ParamTable {
        static TABLE: OnceLock<ParamTable> = OnceLock::new();
        TABLE.get_or_init(|| ParamTable::new(slic3r_defs()))
    }

    pub fn get(&self, name: &str) -> Option<&ParamDef> {
        self.defs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    pub fn default_of(&self, name: &str) -> Option<&ParamValue> {
        self.defs.get(name).and_then(|d| d.default.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamDef> {
        self.defs.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.defs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

fn pair(x: impl Into<ParamValue>, y: impl Into<ParamValue>) -> ParamValue {
    ParamValue::List(vec![x.into(), y.into()])
}

#[allow(clippy::too_many_lines)]
fn slic3r_defs() -> Vec<ParamDef> {
    use ParamDef as P;
    vec![
        // printer
        P::fixed("nozzle_diameter", 0.5).derived(),
        P::fixed("print_center", pair(100.0, 100.0)).derived(),
        P::fixed("z_offset", 0.0),
        P::fixed("gcode_flavor", gcode_flavor::REPRAP),
        P::fixed("use_relative_e_distances", false),
        P::fixed("use_firmware_retraction", false),
        P::fixed("gcode_arcs", false),
        P::fixed("gcode_comments", false),
        P::fixed("vibration_limit", 0.0),
        // filament
        P::fixed("filament_diameter", 3.0),
        P::fixed("extrusion_multiplier", 1.0),
        P::fixed("temperature", 200_i64),
        P::fixed("first_layer_temperature", 200_i64),
        P::fixed("bed_temperature", 0_i64),
        // speeds
        P::fixed("travel_speed", 130.0),
        P::fixed("perimeter_speed", 30.0),
        P::percent("small_perimeter_speed", 30.0),
        P::percent("external_perimeter_speed", "70%"),
        P::percent("infill_speed", 60.0),
        P::percent("solid_infill_speed", 60.0),
        P::percent("top_solid_infill_speed", 50.0),
        P::percent("support_material_speed", 60.0),
        P::percent("support_material_interface_speed", "100%"),
        P::percent("bridge_speed", 60.0),
        P::percent("gap_fill_speed", 20.0),
        P::percent("first_layer_speed", "30%"),
        // acceleration
        P::fixed("perimeter_acceleration", 0.0),
        P::fixed("infill_acceleration", 0.0),
        P::fixed("bridge_acceleration", 0.0),
        P::fixed("first_layer_acceleration", 0.0),
        P::fixed("default_acceleration", 0.0),
        // layers and perimeters
        P::fixed("layer_height", 0.3),
        P::percent("first_layer_height", 0.35),
        P::fixed("infill_every_layers", 1_i64),
        P::fixed("solid_infill_every_layers", 0_i64),
        P::fixed("perimeters", 3_i64),
        P::fixed("top_solid_layers", 3_i64),
        P::fixed("bottom_solid_layers", 3_i64),
        P::fixed("solid_layers", 3_i64),
        // infill
        P::percent("fill_density", "40%"),
        P::fixed("fill_angle", 45_i64),
        P::fixed("fill_pattern", fill_pattern::HONEYCOMB),
        P::fixed("solid_fill_pattern", fill_pattern::RECTILINEAR),
        P::fixed("solid_infill_below_area", 70.0),
        P::fixed("infill_only_where_needed", false),
        P::fixed("infill_first", false),
        // custom G-code hooks
        P::unset("start_gcode", ParamShape::Text),
        P::unset("end_gcode", ParamShape::Text),
        P::unset("layer_gcode", ParamShape::Text),
        P::unset("toolchange_gcode", ParamShape::Text),
        // quality
        P::fixed("seam_position", seam_position::ALIGNED),
        P::fixed("external_perimeters_first", false),
        P::fixed("spiral_vase", false),
        P::fixed("only_retract_when_crossing_perimeters", false),
        P::fixed("extra_perimeters", true),
        P::fixed("avoid_crossing_perimeters", false),
        P::fixed("thin_walls", true),
        P::fixed("overhangs", true),
        // support material
        P::fixed("support_material", false),
        P::fixed("support_material_threshold", 0_i64),
        P::fixed("support_material_pattern", support_pattern::HONEYCOMB),
        P::fixed("support_material_spacing", 2.5),
        P::fixed("support_material_angle", 0_i64),
        P::fixed("support_material_interface_layers", 3_i64),
        P::fixed("support_material_interface_spacing", 0.0),
        P::fixed("raft_layers", 0_i64),
        P::fixed("support_material_enforce_layers", 0_i64),
        P::fixed("dont_support_bridges", true),
        // retraction
        P::fixed("retract_length", 1.0),
        P::fixed("retract_speed", 30.0),
        P::fixed("retract_restart_extra", 0.0),
        P::fixed("retract_before_travel", 2.0),
        P::fixed("retract_lift", 0.0),
        P::fixed("retract_layer_change", true),
        P::fixed("retract_length_toolchange", 1.0),
        P::fixed("retract_restart_extra_toolchange", 1.0),
        // cooling
        P::fixed("cooling", false),
        P::fixed("min_fan_speed", 35_i64),
        P::fixed("max_fan_speed", 100_i64),
        P::fixed("bridge_fan_speed", 100_i64),
        P::fixed("fan_below_layer_time", 60_i64),
        P::fixed("slowdown_below_layer_time", 30_i64),
        P::fixed("min_print_speed", 10.0),
        P::fixed("disable_fan_first_layers", 1_i64),
        P::fixed("fan_always_on", false),
        // skirt and brim
        P::fixed("skirts", 1_i64),
        P::fixed("skirt_distance", 6.0),
        P::fixed("skirt_height", 1_i64),
        P::fixed("min_skirt_length", 0.0),
        P::fixed("brim_width", 0.0),
        // transform
        P::fixed("scale", 1.0),
        P::fixed("rotate", 0.0),
        P::fixed("duplicate", 1_i64),
        P::fixed("duplicate_grid", pair(1_i64, 1_i64)),
        P::fixed("duplicate_distance", 6.0),
        P::fixed("xy_size_compensation", 0.0),
        // sequential printing
        P::fixed("complete_objects", false),
        P::fixed("extruder_clearance_radius", 20.0),
        P::fixed("extruder_clearance_height", 20.0),
        // output
        P::fixed("notes", ""),
        P::fixed("resolution", 0.0),
        // extrusion widths
        P::percent("extrusion_width", "100%"),
        P::percent("first_layer_extrusion_width", "100%"),
        P::percent("perimeter_extrusion_width", "100%"),
        P::percent("external_perimeter_extrusion_width", "100%"),
        P::percent("infill_extrusion_width", "100%"),
        P::percent("solid_infill_extrusion_width", "100%"),
        P::percent("top_infill_extrusion_width", "100%"),
        P::percent("support_material_extrusion_width", "100%"),
        P::fixed("bridge_flow_ratio", 1.0),
        // multiple extruders
        P::fixed("extruder_offset", "0x0"),
        P::fixed("perimeter_extruder", 1_i64),
        P::fixed("infill_extruder", 1_i64),
        P::fixed("support_material_extruder", 1_i64),
        P::fixed("support_material_interface_extruder", 1_i64),
        P::fixed("ooze_prevention", false),
        P::fixed("standby_temperature_delta", -5_i64),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slic3r_table_is_built_once() {
        let a = ParamTable::slic3r() as *const ParamTable;
        let b = ParamTable::slic3r() as *const ParamTable;
        assert_eq!(a, b);
    }

    #[test]
    fn every_default_matches_its_shape() {
        for def in ParamTable::slic3r().iter() {
            if let Some(default) = &def.default {
                assert!(
                    def.shape.accepts(default),
                    "{} default {default:?} does not fit {:?}",
                    def.name,
                    def.shape
                );
            }
        }
    }

    #[test]
    fn speeds_are_percent_or_number() {
        let table = ParamTable::slic3r();
        for name in ["external_perimeter_speed", "first_layer_speed", "fill_density"] {
            assert_eq!(table.get(name).unwrap().shape, ParamShape::PercentOrNumber);
        }
    }

    #[test]
    fn gcode_hooks_have_no_default() {
        let table = ParamTable::slic3r();
        assert!(table.contains("start_gcode"));
        assert!(table.default_of("start_gcode").is_none());
    }

    #[test]
    fn geometry_parameters_are_derived() {
        let table = ParamTable::slic3r();
        assert!(table.get("print_center").unwrap().derived);
        assert!(table.get("nozzle_diameter").unwrap().derived);
        assert!(!table.get("layer_height").unwrap().derived);
    }
}
