//! Static description of the XPON object tree.
//!
//! Everything known about the data model at compile time lives here: the
//! object types, their generic paths, their unique keys, the children a
//! discovery pass must visit, and the parameters the vendor backend is
//! allowed to update. All other components classify paths and validate
//! requests against this table.

use crate::error::{DmError, DmResult};
use crate::value::ParamKind;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Name of the read-write enable parameter.
pub const ENABLE_PARAM: &str = "Enable";

/// Name of the string key parameter used by most templates.
pub const NAME_PARAM: &str = "Name";

/// Name of the status parameter of interface objects.
pub const STATUS_PARAM: &str = "Status";

/// Name of the computed uptime parameter of interface objects.
pub const LAST_CHANGE_PARAM: &str = "LastChange";

/// Name of the PON mode parameter of ANI and Transceiver objects.
pub const PON_MODE_PARAM: &str = "PONMode";

/// Name of the PLOAM password parameter of the Authentication object.
pub const PASSWORD_PARAM: &str = "Password";

/// Name of the flag marking the PLOAM password as hexadecimal.
pub const HEX_PASSWORD_PARAM: &str = "HexadecimalPassword";

/// Identifies an object type in the XPON data model.
///
/// The discriminants are stable: they double as indexes into
/// [`OBJECT_INFO`], which [`self_check`] verifies at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectId {
    Onu = 0,
    SoftwareImage,
    EthernetUni,
    Ani,
    GemPort,
    Transceiver,
    OnuActivation,
    Authentication,
    PerformanceThresholds,
    TcAlarms,
}

impl ObjectId {
    /// Number of object types in the catalog.
    pub const COUNT: usize = 10;

    /// All object types, in catalog order.
    pub const ALL: [ObjectId; Self::COUNT] = [
        ObjectId::Onu,
        ObjectId::SoftwareImage,
        ObjectId::EthernetUni,
        ObjectId::Ani,
        ObjectId::GemPort,
        ObjectId::Transceiver,
        ObjectId::OnuActivation,
        ObjectId::Authentication,
        ObjectId::PerformanceThresholds,
        ObjectId::TcAlarms,
    ];

    /// True for the interface object types that carry Status/LastChange
    /// side state.
    pub fn is_interface(self) -> bool {
        matches!(self, ObjectId::EthernetUni | ObjectId::Ani)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(info(*self).name)
    }
}

/// Describes one parameter of an object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamInfo {
    /// Parameter name, e.g. "Enable".
    pub name: &'static str,
    /// Expected value kind.
    pub kind: ParamKind,
}

/// Compile-time description of one object type in the XPON data model.
///
/// - `generic_path`: object path with all instance indexes replaced by
///   the wildcard segment, e.g. "XPON.ONU.x.SoftwareImage".
/// - `key_name`: the unique key of a template object; `None` for
///   singletons.
/// - `key_max_value`: maximum for numeric keys; string keys have no bound.
/// - `singletons` / `templates`: the children a discovery pass visits.
///   Authentication is deliberately absent from ANI's children here:
///   credentials are never queried from hardware.
/// - `params`: the parameters the vendor backend may supply or update.
/// - `has_rw_enable`: true if new instances of this type must consult the
///   persisted enable flag.
#[derive(Debug, Clone, Copy)]
pub struct ObjectInfo {
    pub id: ObjectId,
    pub name: &'static str,
    pub generic_path: &'static str,
    pub key_name: Option<&'static str>,
    pub key_max_value: Option<u32>,
    pub singletons: &'static [&'static str],
    pub templates: &'static [&'static str],
    pub params: &'static [ParamInfo],
    pub has_rw_enable: bool,
}

const fn p(name: &'static str, kind: ParamKind) -> ParamInfo {
    ParamInfo { name, kind }
}

static ONU_PARAMS: &[ParamInfo] = &[
    p(ENABLE_PARAM, ParamKind::Bool),
    p("Version", ParamKind::String),
    p("EquipmentID", ParamKind::String),
    p("UsePPTPEthernetUNIasIFtoNonOmciDomain", ParamKind::Bool),
];

static SOFTWARE_IMAGE_PARAMS: &[ParamInfo] = &[
    p("Version", ParamKind::String),
    p("IsCommitted", ParamKind::Bool),
    p("IsActive", ParamKind::Bool),
    p("IsValid", ParamKind::Bool),
];

static ETHERNET_UNI_PARAMS: &[ParamInfo] = &[
    p(ENABLE_PARAM, ParamKind::Bool),
    p(STATUS_PARAM, ParamKind::String),
    p(LAST_CHANGE_PARAM, ParamKind::Uint32),
    p("ANIs", ParamKind::CsvString),
    p("InterdomainID", ParamKind::String),
    p("InterdomainName", ParamKind::String),
];

static ANI_PARAMS: &[ParamInfo] = &[
    p(ENABLE_PARAM, ParamKind::Bool),
    p(STATUS_PARAM, ParamKind::String),
    p(LAST_CHANGE_PARAM, ParamKind::Uint32),
    p(PON_MODE_PARAM, ParamKind::String),
];

static GEM_PORT_PARAMS: &[ParamInfo] = &[
    p("Direction", ParamKind::String),
    p("PortType", ParamKind::String),
];

static TRANSCEIVER_PARAMS: &[ParamInfo] = &[
    p("Identifier", ParamKind::Uint32),
    p("VendorName", ParamKind::String),
    p("VendorPartNumber", ParamKind::String),
    p("VendorRevision", ParamKind::String),
    p(PON_MODE_PARAM, ParamKind::String),
    p("Connector", ParamKind::String),
    p("NominalBitRateDownstream", ParamKind::Uint32),
    p("NominalBitRateUpstream", ParamKind::Uint32),
    p("RxPower", ParamKind::Int32),
    p("TxPower", ParamKind::Int32),
    p("Voltage", ParamKind::Uint32),
    p("Bias", ParamKind::Uint32),
    p("Temperature", ParamKind::Int32),
];

static ONU_ACTIVATION_PARAMS: &[ParamInfo] = &[
    p("ONUState", ParamKind::String),
    p("VendorID", ParamKind::String),
    p("SerialNumber", ParamKind::String),
    p("ONUID", ParamKind::Uint32),
];

static AUTHENTICATION_PARAMS: &[ParamInfo] = &[
    p(PASSWORD_PARAM, ParamKind::String),
    p(HEX_PASSWORD_PARAM, ParamKind::Bool),
];

static PERFORMANCE_THRESHOLDS_PARAMS: &[ParamInfo] = &[
    p("SignalFail", ParamKind::Uint32),
    p("SignalDegrade", ParamKind::Uint32),
];

static TC_ALARMS_PARAMS: &[ParamInfo] = &[
    p("LOS", ParamKind::Bool),
    p("LOF", ParamKind::Bool),
    p("SF", ParamKind::Bool),
    p("SD", ParamKind::Bool),
    p("LCDG", ParamKind::Bool),
    p("TF", ParamKind::Bool),
    p("SUF", ParamKind::Bool),
    p("MEM", ParamKind::Bool),
    p("DACT", ParamKind::Bool),
    p("DIS", ParamKind::Bool),
    p("MIS", ParamKind::Bool),
    p("PEE", ParamKind::Bool),
    p("RDI", ParamKind::Bool),
    p("LODS", ParamKind::Bool),
    p("ROGUE", ParamKind::Bool),
];

/// Info about all object types in the XPON data model.
///
/// The element at index `i` must have `i` as the discriminant of its id.
pub static OBJECT_INFO: [ObjectInfo; ObjectId::COUNT] = [
    ObjectInfo {
        id: ObjectId::Onu,
        name: "ONU",
        generic_path: "XPON.ONU",
        key_name: Some(NAME_PARAM),
        key_max_value: None,
        singletons: &[],
        templates: &["SoftwareImage", "EthernetUNI", "ANI"],
        params: ONU_PARAMS,
        has_rw_enable: true,
    },
    ObjectInfo {
        id: ObjectId::SoftwareImage,
        name: "SoftwareImage",
        generic_path: "XPON.ONU.x.SoftwareImage",
        key_name: Some("ID"),
        key_max_value: Some(1),
        singletons: &[],
        templates: &[],
        params: SOFTWARE_IMAGE_PARAMS,
        has_rw_enable: false,
    },
    ObjectInfo {
        id: ObjectId::EthernetUni,
        name: "EthernetUNI",
        generic_path: "XPON.ONU.x.EthernetUNI",
        key_name: Some(NAME_PARAM),
        key_max_value: None,
        singletons: &[],
        templates: &[],
        params: ETHERNET_UNI_PARAMS,
        has_rw_enable: false,
    },
    ObjectInfo {
        id: ObjectId::Ani,
        name: "ANI",
        generic_path: "XPON.ONU.x.ANI",
        key_name: Some(NAME_PARAM),
        key_max_value: None,
        singletons: &[
            "TC.ONUActivation",
            "TC.PerformanceThresholds",
            "TC.Alarms",
        ],
        templates: &["TC.GEM.Port", "Transceiver"],
        params: ANI_PARAMS,
        has_rw_enable: true,
    },
    ObjectInfo {
        id: ObjectId::GemPort,
        name: "GEMPort",
        generic_path: "XPON.ONU.x.ANI.x.TC.GEM.Port",
        key_name: Some("PortID"),
        key_max_value: Some(65534),
        singletons: &[],
        templates: &[],
        params: GEM_PORT_PARAMS,
        has_rw_enable: false,
    },
    ObjectInfo {
        id: ObjectId::Transceiver,
        name: "Transceiver",
        generic_path: "XPON.ONU.x.ANI.x.Transceiver",
        key_name: Some("ID"),
        key_max_value: Some(1),
        singletons: &[],
        templates: &[],
        params: TRANSCEIVER_PARAMS,
        has_rw_enable: false,
    },
    ObjectInfo {
        id: ObjectId::OnuActivation,
        name: "ONUActivation",
        generic_path: "XPON.ONU.x.ANI.x.TC.ONUActivation",
        key_name: None,
        key_max_value: None,
        singletons: &[],
        templates: &[],
        params: ONU_ACTIVATION_PARAMS,
        has_rw_enable: false,
    },
    ObjectInfo {
        id: ObjectId::Authentication,
        name: "Authentication",
        generic_path: "XPON.ONU.x.ANI.x.TC.Authentication",
        key_name: None,
        key_max_value: None,
        singletons: &[],
        templates: &[],
        params: AUTHENTICATION_PARAMS,
        has_rw_enable: false,
    },
    ObjectInfo {
        id: ObjectId::PerformanceThresholds,
        name: "PerformanceThresholds",
        generic_path: "XPON.ONU.x.ANI.x.TC.PerformanceThresholds",
        key_name: None,
        key_max_value: None,
        singletons: &[],
        templates: &[],
        params: PERFORMANCE_THRESHOLDS_PARAMS,
        has_rw_enable: false,
    },
    ObjectInfo {
        id: ObjectId::TcAlarms,
        name: "TC.Alarms",
        generic_path: "XPON.ONU.x.ANI.x.TC.Alarms",
        key_name: None,
        key_max_value: None,
        singletons: &[],
        templates: &[],
        params: TC_ALARMS_PARAMS,
        has_rw_enable: false,
    },
];

static PATH_TO_ID: Lazy<HashMap<&'static str, ObjectId>> = Lazy::new(|| {
    OBJECT_INFO
        .iter()
        .map(|info| (info.generic_path, info.id))
        .collect()
});

/// Returns the catalog entry for an object type.
pub fn info(id: ObjectId) -> &'static ObjectInfo {
    &OBJECT_INFO[id as usize]
}

/// Returns the parameter descriptors of an object type.
pub fn params(id: ObjectId) -> &'static [ParamInfo] {
    info(id).params
}

/// Returns the declared kind of a parameter, or `None` if the object type
/// does not declare it.
pub fn param_kind(id: ObjectId, name: &str) -> Option<ParamKind> {
    params(id).iter().find(|p| p.name == name).map(|p| p.kind)
}

/// Looks up an object type by its exact generic path.
pub fn lookup_generic(generic_path: &str) -> Option<ObjectId> {
    PATH_TO_ID.get(generic_path).copied()
}

/// Verifies the catalog invariants.
///
/// Must be called once at startup; a failure is fatal.
pub fn self_check() -> DmResult<()> {
    for (i, entry) in OBJECT_INFO.iter().enumerate() {
        if entry.id as usize != i {
            return Err(DmError::Catalog {
                reason: format!("OBJECT_INFO[{}].id={} != {}", i, entry.id as usize, i),
            });
        }
        if lookup_generic(entry.generic_path) != Some(entry.id) {
            return Err(DmError::Catalog {
                reason: format!("generic path '{}' does not map back", entry.generic_path),
            });
        }
        if entry.key_max_value.is_some() && entry.key_name.is_none() {
            return Err(DmError::Catalog {
                reason: format!("{} has a key bound but no key", entry.name),
            });
        }
    }
    Ok(())
}
