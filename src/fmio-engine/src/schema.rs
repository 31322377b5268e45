// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Static schema tables: which quantities and model properties the
//! engine understands.  Lookups go through lower-cased names; there is
//! no per-property behavior beyond what the tables describe.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::common::canonicalize;
use crate::section::Document;

/// Semantic tag of a quantity.  Filtering decisions (for example
/// keeping morphology boundaries out of the flow bc file) look at this
/// tag, never at the data type of a boundary condition.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum QuantityKind {
    Flow,
    Transport,
    Morphology,
    Meteo,
    Spatial,
    Lateral,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuantityInfo {
    pub name: &'static str,
    pub unit: &'static str,
    pub kind: QuantityKind,
    /// Process the quantity belongs to, used to split bc files per process.
    pub process: &'static str,
    /// Whether the name is a prefix followed by a tracer or fraction name.
    pub is_prefix: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuantityMatch {
    pub info: &'static QuantityInfo,
    /// Tracer or sediment fraction name that followed a prefix quantity.
    pub suffix: Option<String>,
}

/// Collaborator interface: enumerates the quantity names a reader
/// accepts.  Anything it does not know goes to the unknown-item store.
pub trait QuantitySchema {
    fn lookup(&self, name: &str) -> Option<QuantityMatch>;

    fn is_known(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }
}

const fn quantity(
    name: &'static str,
    unit: &'static str,
    kind: QuantityKind,
    process: &'static str,
) -> QuantityInfo {
    QuantityInfo {
        name,
        unit,
        kind,
        process,
        is_prefix: false,
    }
}

const fn prefix(
    name: &'static str,
    unit: &'static str,
    kind: QuantityKind,
    process: &'static str,
) -> QuantityInfo {
    QuantityInfo {
        name,
        unit,
        kind,
        process,
        is_prefix: true,
    }
}

use QuantityKind::*;

static QUANTITIES: &[QuantityInfo] = &[
    // boundaries
    quantity("waterlevelbnd", "m", Flow, "flow"),
    quantity("dischargebnd", "m3/s", Flow, "flow"),
    quantity("qhbnd", "m", Flow, "flow"),
    quantity("velocitybnd", "m/s", Flow, "flow"),
    quantity("neumannbnd", "-", Flow, "flow"),
    quantity("riemannbnd", "m", Flow, "flow"),
    quantity("riemann_velocitybnd", "m/s", Flow, "flow"),
    quantity("normalvelocitybnd", "m/s", Flow, "flow"),
    quantity("tangentialvelocitybnd", "m/s", Flow, "flow"),
    quantity("uxuyadvectionvelocitybnd", "m/s", Flow, "flow"),
    quantity("salinitybnd", "ppt", Transport, "salinity"),
    quantity("temperaturebnd", "degC", Transport, "temperature"),
    prefix("tracerbnd", "-", Transport, "tracer"),
    prefix("sedfracbnd", "kg/m3", Transport, "sediment"),
    quantity("bedlevelbnd", "m", Morphology, "morphology"),
    quantity("bedlevelchangebnd", "m/s", Morphology, "morphology"),
    quantity("bedloadbnd", "m3/s/m", Morphology, "morphology"),
    // initial and spatial fields
    quantity("initialwaterlevel", "m", Spatial, "flow"),
    quantity("initialsalinity", "ppt", Spatial, "salinity"),
    quantity("initialtemperature", "degC", Spatial, "temperature"),
    quantity("initialvelocityx", "m/s", Spatial, "flow"),
    quantity("initialvelocityy", "m/s", Spatial, "flow"),
    quantity("frictioncoefficient", "-", Spatial, "flow"),
    quantity("horizontaleddyviscositycoefficient", "m2/s", Spatial, "flow"),
    quantity("horizontaleddydiffusivitycoefficient", "m2/s", Spatial, "flow"),
    // meteo
    quantity("windx", "m/s", Meteo, "meteo"),
    quantity("windy", "m/s", Meteo, "meteo"),
    quantity("windxy", "m/s", Meteo, "meteo"),
    quantity("rainfall", "mm/day", Meteo, "meteo"),
    quantity("rainfall_rate", "mm/hr", Meteo, "meteo"),
    quantity("atmosphericpressure", "Pa", Meteo, "meteo"),
    quantity("airpressure_windx_windy", "-", Meteo, "meteo"),
    quantity("humidity_airtemperature_cloudiness", "-", Meteo, "meteo"),
    quantity(
        "humidity_airtemperature_cloudiness_solarradiation",
        "-",
        Meteo,
        "meteo",
    ),
    // laterals
    quantity("lateraldischarge1d", "m3/s", Lateral, "flow"),
    quantity("lateral_discharge", "m3/s", Lateral, "flow"),
];

lazy_static! {
    static ref QUANTITY_INDEX: HashMap<&'static str, &'static QuantityInfo> =
        QUANTITIES.iter().map(|q| (q.name, q)).collect();
}

/// The built-in quantity table.
#[derive(Copy, Clone, Debug, Default)]
pub struct KnownQuantities;

impl QuantitySchema for KnownQuantities {
    fn lookup(&self, name: &str) -> Option<QuantityMatch> {
        let name = canonicalize(name);
        if let Some(info) = QUANTITY_INDEX.get(name.as_str()) {
            return Some(QuantityMatch {
                info,
                suffix: None,
            });
        }
        QUANTITIES
            .iter()
            .filter(|q| q.is_prefix)
            .find(|q| name.starts_with(q.name))
            .map(|info| {
                let rest = name[info.name.len()..].trim_start_matches('_');
                QuantityMatch {
                    info,
                    suffix: if rest.is_empty() {
                        None
                    } else {
                        Some(rest.to_owned())
                    },
                }
            })
    }
}

/// A condition under which a model property applies.  A property whose
/// conditions do not all hold is written with its default value.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Condition {
    GreaterThan(&'static str, f64),
    Equals(&'static str, &'static str),
}

impl Condition {
    fn holds(&self, lookup: &dyn Fn(&str) -> Option<String>) -> bool {
        match *self {
            Condition::GreaterThan(key, bound) => lookup(key)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .map(|v| v > bound)
                .unwrap_or(false),
            Condition::Equals(key, expected) => lookup(key)
                .map(|v| v.trim().eq_ignore_ascii_case(expected))
                .unwrap_or(false),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDef {
    pub section: &'static str,
    pub key: &'static str,
    pub default: &'static str,
    pub description: &'static str,
    pub enabled_when: &'static [Condition],
}

impl PropertyDef {
    /// Whether this property applies given the other values in `doc`.
    /// Conditions are looked up anywhere in the document.
    pub fn is_enabled(&self, doc: &Document) -> bool {
        let lookup = |key: &str| -> Option<String> {
            doc.sections
                .iter()
                .find_map(|s| s.get(key))
                .map(|v| v.to_owned())
        };
        self.enabled_when.iter().all(|c| c.holds(&lookup))
    }
}

const fn def(
    section: &'static str,
    key: &'static str,
    default: &'static str,
    description: &'static str,
) -> PropertyDef {
    PropertyDef {
        section,
        key,
        default,
        description,
        enabled_when: &[],
    }
}

const fn def_when(
    section: &'static str,
    key: &'static str,
    default: &'static str,
    description: &'static str,
    enabled_when: &'static [Condition],
) -> PropertyDef {
    PropertyDef {
        section,
        key,
        default,
        description,
        enabled_when,
    }
}

const Z_LAYERS: &[Condition] = &[
    Condition::GreaterThan("Kmx", 0.0),
    Condition::Equals("Layertype", "2"),
];
const LAYERED: &[Condition] = &[Condition::GreaterThan("Kmx", 0.0)];

static MDU_PROPERTIES: &[PropertyDef] = &[
    def("General", "Program", "D-Flow FM", "Program"),
    def("General", "Version", "", "Version number of computational kernel"),
    def("General", "fileType", "modelDef", "File type. Do not edit this."),
    def("General", "fileVersion", "1.09", "File format version (do not edit this)"),
    def(
        "General",
        "AutoStart",
        "0",
        "Autostart simulation after loading MDU (0: no, 1: autostart, 2: autostartstop)",
    ),
    def(
        "General",
        "PathsRelativeToParent",
        "0",
        "Whether or not (1/0) to resolve file names (e.g. inside the *.ext file) relative to their direct parent, instead of to the toplevel MDU working dir",
    ),
    def("geometry", "NetFile", "", "Unstructured grid file *_net.nc"),
    def("geometry", "BathymetryFile", "", "Bathymetry points file *.xyb"),
    def(
        "geometry",
        "GridEnclosureFile",
        "",
        "Enclosure file to clip outer parts from the grid *.pol",
    ),
    def("geometry", "DryPointsFile", "", "Dry points file *.xyz, third column dummy z values, or polygon file *.pol"),
    def("geometry", "LandBoundaryFile", "", "Land boundaries file *.ldb, used for visualization"),
    def("geometry", "ThinDamFile", "", "Polyline file *_thd.pli, containing thin dams"),
    def("geometry", "FixedWeirFile", "", "Polyline file *_fxw.pliz, containing fixed weirs with rows x, y, crest level, left ground level, right ground level"),
    def("geometry", "StructureFile", "", "File *.ini containing list of structures (pumps, weirs, gates and general structures)"),
    def("geometry", "ObsFile", "", "Points file *.xyn with observation stations with rows x, y, station name"),
    def("geometry", "CrsFile", "", "Polyline file *_crs.pli defining observation cross sections"),
    def(
        "geometry",
        "BedLevUni",
        "-5",
        "Uniform bed level used at missing z values if BedlevType > 2",
    ),
    def(
        "geometry",
        "BedLevType",
        "3",
        "Bathymetry specification (1: at cell centers, 2: at faces, 3: at nodes, face levels mean of node values, 4: at nodes, face levels min. of node values, 5: at nodes, face levels max. of node values, 6: at nodes, face levels max. of cell-center values)",
    ),
    def("geometry", "Kmx", "0", "Maximum number of vertical layers"),
    def(
        "geometry",
        "Layertype",
        "1",
        "Vertical layer type (1: all sigma, 2: all z, 3: use VertplizFile)",
    ),
    def_when(
        "geometry",
        "Numtopsig",
        "0",
        "Number of sigma layers in top of z-layer model",
        Z_LAYERS,
    ),
    def_when(
        "geometry",
        "NumTopSigUniform",
        "1",
        "Number of sigma layers in top of z-layer model is uniform or not",
        Z_LAYERS,
    ),
    def_when(
        "geometry",
        "SigmaGrowthFactor",
        "1",
        "Layer thickness growth factor from bed up",
        LAYERED,
    ),
    def_when(
        "geometry",
        "Dztop",
        "-999",
        "Z-layer thickness of layers above level Dztopuniabovez",
        Z_LAYERS,
    ),
    def_when(
        "geometry",
        "FloorLevTopLay",
        "-999",
        "Floor level of top layer",
        Z_LAYERS,
    ),
    def_when(
        "geometry",
        "DzTopUniAboveZ",
        "-999",
        "Above level Dztopuniabovez layers will have uniform Dztop, SigmaGrowthFactor below this level",
        Z_LAYERS,
    ),
    def("numerics", "CFLMax", "0.7", "Maximum Courant number"),
    def("numerics", "Icgsolver", "4", "Solver type (1: sobekGS_OMP, 2: sobekGS_OMPthreadsafe, 4: sparsekit, 6: PETSc, 7: GS)"),
    def("numerics", "Tlfsmo", "0", "Fourier smoothing time (s) on water level boundaries"),
    def("physics", "UnifFrictCoef", "0.023", "Uniform friction coefficient (0: no friction)"),
    def("physics", "UnifFrictType", "1", "Uniform friction type (0: Chezy, 1: Manning, 2: White-Colebrook, 3: idem, WAQUA style)"),
    def("physics", "Vicouv", "1", "Uniform horizontal eddy viscosity (m2/s)"),
    def("physics", "Dicouv", "1", "Uniform horizontal eddy diffusivity (m2/s)"),
    def("physics", "Salinity", "0", "Include salinity, (0=no, 1=yes)"),
    def("physics", "Temperature", "0", "Include temperature (0: no, 1: only transport, 3: excess model of D3D, 5: composite (ocean) model)"),
    def("trachytopes", "TrtRou", "N", "Flag for trachytopes (Y=on, N=off)"),
    def("trachytopes", "DtTrt", "60", "Trachytope roughness update time interval (s)"),
    def("time", "RefDate", "20010101", "Reference date (yyyymmdd)"),
    def("time", "Tzone", "0", "Time zone assigned to input time series"),
    def("time", "Tunit", "S", "Time unit for start/stop times (H, M or S)"),
    def("time", "DtUser", "300", "Time interval (s) for external forcing update"),
    def("time", "DtMax", "30", "Maximal computation timestep (s)"),
    def("time", "DtInit", "1", "Initial computation timestep (s)"),
    def(
        "time",
        "StartDateTime",
        "",
        "Computation Startdatetime (yyyymmddhhmmss), when specified, overrides Tstart",
    ),
    def(
        "time",
        "StopDateTime",
        "",
        "Computation Stopdatetime  (yyyymmddhhmmss), when specified, overrides Tstop",
    ),
    def("restart", "RestartFile", "", "Restart netcdf-file, either *_rst.nc or *_map.nc"),
    def("restart", "RestartDateTime", "", "Restart date and time (yyyymmddhhmmss) when restarting from *_map.nc"),
    def(
        "external forcing",
        "ExtForceFile",
        "",
        "Old format for external forcings file *.ext, link with tim/cmp-format boundary conditions specification",
    ),
    def(
        "external forcing",
        "ExtForceFileNew",
        "",
        "New format for external forcings file *.ext, link with bc-format boundary conditions specification",
    ),
    def("sediment", "MorFile", "", "Morphology settings file (*.mor)"),
    def("sediment", "SedFile", "", "Sediment characteristics file (*.sed)"),
    def(
        "output",
        "OutputDir",
        "",
        "Output directory of map-, his-, rst-, dat- and timings-files, default: DFM_OUTPUT_<modelname>. Set to . for current dir.",
    ),
    def("output", "HisInterval", "300", "History output times, given as \"interval\" \"start period\" \"end period\" (s)"),
    def("output", "MapInterval", "1200", "Map file output, given as \"interval\" \"start period\" \"end period\" (s)"),
    def("output", "RstInterval", "0", "Restart file output times, given as \"interval\" \"start period\" \"end period\" (s)"),
    def("output", "MapFormat", "4", "Map file format, 1: netCDF, 2: Tecplot, 3: netCFD and Tecplot, 4: NetCDF-UGRID"),
];

lazy_static! {
    static ref MDU_INDEX: HashMap<String, &'static PropertyDef> = MDU_PROPERTIES
        .iter()
        .map(|p| (canonicalize(p.key), p))
        .collect();
}

/// The model definition property table.
#[derive(Copy, Clone, Debug, Default)]
pub struct MduSchema;

impl MduSchema {
    pub fn lookup(&self, key: &str) -> Option<&'static PropertyDef> {
        MDU_INDEX.get(&canonicalize(key)).copied()
    }

    pub fn properties(&self) -> &'static [PropertyDef] {
        MDU_PROPERTIES
    }

    /// Canonical section order, as first seen in the table.
    pub fn section_order(&self) -> Vec<&'static str> {
        let mut order: Vec<&'static str> = vec![];
        for p in MDU_PROPERTIES {
            if !order.iter().any(|s| s.eq_ignore_ascii_case(p.section)) {
                order.push(p.section);
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenizerOptions;

    #[test]
    fn test_lookup_case_insensitive() {
        let schema = KnownQuantities;
        let m = schema.lookup("WaterLevelBnd").unwrap();
        assert_eq!("waterlevelbnd", m.info.name);
        assert_eq!(QuantityKind::Flow, m.info.kind);
        assert_eq!(None, m.suffix);
    }

    #[test]
    fn test_lookup_prefix_quantities() {
        let schema = KnownQuantities;
        let m = schema.lookup("tracerbndsalt").unwrap();
        assert_eq!("tracerbnd", m.info.name);
        assert_eq!(Some("salt".to_owned()), m.suffix);

        let m = schema.lookup("sedfracbnd_sand").unwrap();
        assert_eq!("sedfracbnd", m.info.name);
        assert_eq!(Some("sand".to_owned()), m.suffix);
    }

    #[test]
    fn test_unknown_quantity() {
        assert!(!KnownQuantities.is_known("generalstructure"));
        assert!(KnownQuantities.is_known("initialwaterlevel"));
    }

    #[test]
    fn test_morphology_tag() {
        let m = KnownQuantities.lookup("bedlevelbnd").unwrap();
        assert_eq!(QuantityKind::Morphology, m.info.kind);
    }

    #[test]
    fn test_mdu_lookup() {
        let def = MduSchema.lookup("gridenclosurefile").unwrap();
        assert_eq!("geometry", def.section);
        assert_eq!("GridEnclosureFile", def.key);
        assert!(MduSchema.lookup("enclosurefile").is_none());
    }

    #[test]
    fn test_enabled_when() {
        let dztop = MduSchema.lookup("Dztop").unwrap();

        let doc = Document::parse("[geometry]\nKmx = 0\nLayertype = 2\n", &TokenizerOptions::MDU).unwrap();
        assert!(!dztop.is_enabled(&doc));

        let doc = Document::parse("[geometry]\nKmx = 10\nLayertype = 2\n", &TokenizerOptions::MDU).unwrap();
        assert!(dztop.is_enabled(&doc));

        let doc = Document::parse("[geometry]\nKmx = 10\nLayertype = 1\n", &TokenizerOptions::MDU).unwrap();
        assert!(!dztop.is_enabled(&doc));

        let kmx = MduSchema.lookup("kmx").unwrap();
        assert!(kmx.is_enabled(&doc));
    }

    #[test]
    fn test_section_order() {
        let order = MduSchema.section_order();
        assert_eq!("General", order[0]);
        assert!(order.contains(&"external forcing"));
    }
}
