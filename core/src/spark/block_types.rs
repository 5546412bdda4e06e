//! Closed set of Spark block types, the interfaces they implement, and the
//! per-type registry of defaults, field specs and status analyzers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::types::{Block, BlockData, FieldValue, Link, Quantity};

macro_rules! named_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant),)+
                }
            }

            fn parse_known(s: &str) -> Option<Self> {
                match s {
                    $(stringify!($variant) => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

named_enum!(
    /// Interfaces a block type can advertise to link constraints
    BlockIntfType {
        ProcessValueInterface,
        TempSensorInterface,
        SetpointSensorPairInterface,
        ActuatorAnalogInterface,
        ActuatorDigitalInterface,
        BalancerInterface,
        MutexInterface,
        OneWireBusInterface,
        OneWireDeviceInterface,
        IoArrayInterface,
        DS2408Interface,
        EnablerInterface,
        ClaimableInterface,
    }
);

named_enum!(
    KnownBlockType {
        ActuatorAnalogMock,
        ActuatorOffset,
        ActuatorPwm,
        Balancer,
        DigitalActuator,
        DisplaySettings,
        DS2408,
        DS2413,
        MotorValve,
        Mutex,
        OneWireGpioModule,
        Pid,
        SetpointProfile,
        SetpointSensorPair,
        Spark2Pins,
        Spark3Pins,
        TempSensorCombi,
        TempSensorExternal,
        TempSensorMock,
        TempSensorOneWire,
    }
);

/// Block type tag.
///
/// Types the controller reports but this crate does not know are kept as
/// `Other` so the blocks still take part in resolution and derivation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockType {
    Known(KnownBlockType),
    Other(String),
}

impl BlockType {
    pub fn name(&self) -> &str {
        match self {
            BlockType::Known(t) => t.name(),
            BlockType::Other(name) => name,
        }
    }

    pub fn interfaces(&self) -> &'static [BlockIntfType] {
        use BlockIntfType::*;
        use KnownBlockType as K;

        let BlockType::Known(known) = self else {
            return &[];
        };
        match known {
            K::ActuatorAnalogMock => &[ActuatorAnalogInterface, ProcessValueInterface, ClaimableInterface],
            K::ActuatorOffset | K::ActuatorPwm => &[
                ActuatorAnalogInterface,
                ProcessValueInterface,
                EnablerInterface,
                ClaimableInterface,
            ],
            K::Balancer => &[BalancerInterface],
            K::DigitalActuator | K::MotorValve => &[ActuatorDigitalInterface, ClaimableInterface],
            K::DS2408 => &[IoArrayInterface, DS2408Interface, OneWireDeviceInterface],
            K::DS2413 => &[IoArrayInterface, OneWireDeviceInterface],
            K::Mutex => &[MutexInterface],
            K::OneWireGpioModule | K::Spark2Pins | K::Spark3Pins => &[IoArrayInterface],
            K::Pid => &[EnablerInterface],
            K::SetpointProfile => &[EnablerInterface],
            K::SetpointSensorPair => &[
                SetpointSensorPairInterface,
                ProcessValueInterface,
                EnablerInterface,
                ClaimableInterface,
            ],
            K::TempSensorCombi | K::TempSensorExternal | K::TempSensorMock => &[TempSensorInterface],
            K::TempSensorOneWire => &[TempSensorInterface, OneWireDeviceInterface],
            K::DisplaySettings => &[],
        }
    }

    /// Exact type match, or membership of the constraint in `interfaces()`
    pub fn satisfies(&self, constraint: &BlockOrIntfType) -> bool {
        match constraint {
            BlockOrIntfType::Block(t) => t == self,
            BlockOrIntfType::Intf(intf) => self.interfaces().contains(intf),
        }
    }

    pub fn spec(&self) -> Option<&'static BlockSpec> {
        match self {
            BlockType::Known(known) => block_spec(known),
            BlockType::Other(_) => None,
        }
    }
}

impl From<KnownBlockType> for BlockType {
    fn from(value: KnownBlockType) -> Self {
        BlockType::Known(value)
    }
}

impl From<&str> for BlockType {
    fn from(s: &str) -> Self {
        KnownBlockType::parse_known(s)
            .map(BlockType::Known)
            .unwrap_or_else(|| BlockType::Other(s.to_string()))
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Type constraint carried by links and addresses
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BlockOrIntfType {
    Block(BlockType),
    Intf(BlockIntfType),
}

impl BlockOrIntfType {
    pub fn name(&self) -> &str {
        match self {
            BlockOrIntfType::Block(t) => t.name(),
            BlockOrIntfType::Intf(i) => i.name(),
        }
    }
}

impl FromStr for BlockOrIntfType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(BlockIntfType::parse_known(s)
            .map(BlockOrIntfType::Intf)
            .unwrap_or_else(|| BlockOrIntfType::Block(BlockType::from(s))))
    }
}

impl From<String> for BlockOrIntfType {
    fn from(s: String) -> Self {
        match s.parse::<BlockOrIntfType>() {
            Ok(parsed) => parsed,
            Err(never) => match never {},
        }
    }
}

impl From<BlockOrIntfType> for String {
    fn from(value: BlockOrIntfType) -> Self {
        value.name().to_string()
    }
}

impl From<BlockIntfType> for BlockOrIntfType {
    fn from(value: BlockIntfType) -> Self {
        BlockOrIntfType::Intf(value)
    }
}

impl From<KnownBlockType> for BlockOrIntfType {
    fn from(value: KnownBlockType) -> Self {
        BlockOrIntfType::Block(BlockType::Known(value))
    }
}

impl fmt::Display for BlockOrIntfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Functional role of a block type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Process,
    Control,
    Output,
    Constraint,
    Display,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockStatus {
    Active,
    Inactive,
    Disabled,
    Invalid,
}

pub struct FieldSpec {
    pub key: &'static str,
    pub title: &'static str,
    pub readonly: bool,
    pub graphed: bool,
}

pub struct BlockSpec {
    pub block_type: KnownBlockType,
    pub title: &'static str,
    pub role: Role,
    pub generate: fn() -> BlockData,
    pub fields: &'static [FieldSpec],
    pub analyze: fn(&Block) -> BlockStatus,
}

impl BlockSpec {
    pub fn field(&self, key: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn graphed_fields(&self) -> impl Iterator<Item = &'static FieldSpec> {
        self.fields.iter().filter(|f| f.graphed)
    }
}

const fn field(key: &'static str, title: &'static str, readonly: bool, graphed: bool) -> FieldSpec {
    FieldSpec {
        key,
        title,
        readonly,
        graphed,
    }
}

fn link(intf: BlockIntfType) -> FieldValue {
    Link::new(None, Some(intf.into())).into()
}

fn driven_link(intf: BlockIntfType) -> FieldValue {
    Link::new(None, Some(intf.into())).driven().into()
}

fn claimed_by() -> FieldValue {
    Link::new(None, None).into()
}

fn no_constraints() -> FieldValue {
    BlockData::from([("constraints", FieldValue::List(vec![]))]).into()
}

fn qty(value: Option<f64>, unit: &str) -> FieldValue {
    Quantity::new(value, unit).into()
}

fn analyze_active(_: &Block) -> BlockStatus {
    BlockStatus::Active
}

fn analyze_enabled(block: &Block) -> BlockStatus {
    match block.data.get("enabled").and_then(FieldValue::as_bool) {
        Some(false) => BlockStatus::Disabled,
        _ => BlockStatus::Active,
    }
}

fn analyze_pid(block: &Block) -> BlockStatus {
    if analyze_enabled(block) == BlockStatus::Disabled {
        return BlockStatus::Disabled;
    }
    match block.data.get("active").and_then(FieldValue::as_bool) {
        Some(false) => BlockStatus::Inactive,
        _ => BlockStatus::Active,
    }
}

static BALANCER: BlockSpec = BlockSpec {
    block_type: KnownBlockType::Balancer,
    title: "Balancer",
    role: Role::Constraint,
    generate: || BlockData::from([("clients", FieldValue::List(vec![]))]),
    fields: &[],
    analyze: analyze_active,
};

static MUTEX: BlockSpec = BlockSpec {
    block_type: KnownBlockType::Mutex,
    title: "Mutex",
    role: Role::Constraint,
    generate: || {
        BlockData::from([
            ("differentActuatorWait", qty(Some(0.0), "second")),
            ("waitRemaining", qty(Some(0.0), "second")),
        ])
    },
    fields: &[],
    analyze: analyze_active,
};

static MOTOR_VALVE: BlockSpec = BlockSpec {
    block_type: KnownBlockType::MotorValve,
    title: "Motor Valve",
    role: Role::Output,
    generate: || {
        BlockData::from([
            ("hwDevice", link(BlockIntfType::IoArrayInterface)),
            ("channel", 0i64.into()),
            ("storedState", "STATE_INACTIVE".into()),
            ("desiredState", "STATE_INACTIVE".into()),
            ("state", "STATE_INACTIVE".into()),
            ("valveState", "VALVE_INIT_IDLE".into()),
            ("constrainedBy", no_constraints()),
            ("claimedBy", claimed_by()),
            ("settingMode", "STORED".into()),
        ])
    },
    fields: &[
        field("storedState", "Stored state", false, false),
        field("constrainedBy", "Constraints", false, false),
        field("desiredState", "Desired state", true, true),
        field("state", "Actual state", true, true),
    ],
    analyze: analyze_active,
};

static DIGITAL_ACTUATOR: BlockSpec = BlockSpec {
    block_type: KnownBlockType::DigitalActuator,
    title: "Digital Actuator",
    role: Role::Output,
    generate: || {
        BlockData::from([
            ("hwDevice", link(BlockIntfType::IoArrayInterface)),
            ("channel", 0i64.into()),
            ("storedState", "STATE_INACTIVE".into()),
            ("desiredState", "STATE_INACTIVE".into()),
            ("state", "STATE_INACTIVE".into()),
            ("invert", false.into()),
            ("constrainedBy", no_constraints()),
            ("claimedBy", claimed_by()),
        ])
    },
    fields: &[
        field("storedState", "Stored state", false, false),
        field("invert", "Invert", false, false),
        field("constrainedBy", "Constraints", false, false),
        field("state", "Actual state", true, true),
    ],
    analyze: analyze_active,
};

static ACTUATOR_ANALOG_MOCK: BlockSpec = BlockSpec {
    block_type: KnownBlockType::ActuatorAnalogMock,
    title: "Analog Actuator (Mock)",
    role: Role::Output,
    generate: || {
        BlockData::from([
            ("setting", 0.0.into()),
            ("desiredSetting", 0.0.into()),
            ("minSetting", 0.0.into()),
            ("maxSetting", 100.0.into()),
            ("value", 0.0.into()),
            ("minValue", 0.0.into()),
            ("maxValue", 100.0.into()),
            ("constrainedBy", no_constraints()),
            ("claimedBy", claimed_by()),
        ])
    },
    fields: &[
        field("desiredSetting", "Setting", false, true),
        field("minSetting", "Minimum Setting", false, false),
        field("maxSetting", "Maximum Setting", false, false),
        field("minValue", "Minimum Value", false, false),
        field("maxValue", "Maximum Value", false, false),
        field("constrainedBy", "Constraints", false, false),
        field("value", "Measured Value", true, true),
    ],
    analyze: analyze_active,
};

static ACTUATOR_PWM: BlockSpec = BlockSpec {
    block_type: KnownBlockType::ActuatorPwm,
    title: "PWM",
    role: Role::Output,
    generate: || {
        BlockData::from([
            ("actuatorId", driven_link(BlockIntfType::ActuatorDigitalInterface)),
            ("period", qty(Some(10.0), "second")),
            ("storedSetting", 0.0.into()),
            ("desiredSetting", 0.0.into()),
            ("setting", 0.0.into()),
            ("value", 0.0.into()),
            ("enabled", true.into()),
            ("constrainedBy", no_constraints()),
            ("claimedBy", claimed_by()),
        ])
    },
    fields: &[
        field("storedSetting", "Duty Setting", false, false),
        field("period", "Period", false, false),
        field("setting", "Duty Setting", true, true),
        field("value", "Duty Achieved", true, true),
    ],
    analyze: analyze_enabled,
};

static ACTUATOR_OFFSET: BlockSpec = BlockSpec {
    block_type: KnownBlockType::ActuatorOffset,
    title: "Setpoint Driver",
    role: Role::Output,
    generate: || {
        BlockData::from([
            ("targetId", driven_link(BlockIntfType::SetpointSensorPairInterface)),
            ("referenceId", link(BlockIntfType::SetpointSensorPairInterface)),
            ("storedSetting", 0.0.into()),
            ("desiredSetting", 0.0.into()),
            ("setting", 0.0.into()),
            ("value", 0.0.into()),
            ("enabled", true.into()),
            ("constrainedBy", no_constraints()),
            ("claimedBy", claimed_by()),
        ])
    },
    fields: &[
        field("storedSetting", "Target offset", false, false),
        field("setting", "Target offset", true, true),
        field("value", "Actual offset", true, true),
    ],
    analyze: analyze_enabled,
};

static PID: BlockSpec = BlockSpec {
    block_type: KnownBlockType::Pid,
    title: "PID",
    role: Role::Control,
    generate: || {
        BlockData::from([
            ("inputId", link(BlockIntfType::SetpointSensorPairInterface)),
            ("outputId", driven_link(BlockIntfType::ActuatorAnalogInterface)),
            ("enabled", false.into()),
            ("active", true.into()),
            ("kp", qty(Some(20.0), "1 / degC")),
            ("ti", qty(Some(7200.0), "second")),
            ("td", qty(Some(0.0), "second")),
        ])
    },
    fields: &[
        field("kp", "Kp", false, false),
        field("ti", "Ti", false, false),
        field("td", "Td", false, false),
        field("outputValue", "Output value", true, true),
        field("error", "Error", true, true),
    ],
    analyze: analyze_pid,
};

static SETPOINT_SENSOR_PAIR: BlockSpec = BlockSpec {
    block_type: KnownBlockType::SetpointSensorPair,
    title: "Setpoint",
    role: Role::Process,
    generate: || {
        BlockData::from([
            ("sensorId", link(BlockIntfType::TempSensorInterface)),
            ("storedSetting", qty(Some(20.0), "degC")),
            ("desiredSetting", qty(Some(20.0), "degC")),
            ("setting", qty(None, "degC")),
            ("value", qty(None, "degC")),
            ("valueUnfiltered", qty(None, "degC")),
            ("enabled", true.into()),
            ("filter", "FILTER_15s".into()),
            ("filterThreshold", qty(Some(5.0), "delta_degC")),
            ("claimedBy", claimed_by()),
        ])
    },
    fields: &[
        field("storedSetting", "Setting", false, false),
        field("enabled", "Enabled", false, false),
        field("setting", "Setting", true, true),
        field("value", "Sensor value (filtered)", true, true),
        field("valueUnfiltered", "Sensor value (unfiltered)", true, true),
    ],
    analyze: analyze_enabled,
};

static TEMP_SENSOR_EXTERNAL: BlockSpec = BlockSpec {
    block_type: KnownBlockType::TempSensorExternal,
    title: "External Temp Sensor",
    role: Role::Process,
    generate: || {
        BlockData::from([
            ("enabled", true.into()),
            ("timeout", qty(Some(300.0), "second")),
            ("setting", qty(Some(20.0), "degC")),
            ("lastUpdated", FieldValue::null()),
            ("value", qty(None, "degC")),
        ])
    },
    fields: &[
        field("enabled", "Enabled", false, false),
        field("timeout", "Timeout", false, false),
        field("setting", "Setting", false, false),
        field("value", "Sensor value", true, true),
    ],
    analyze: analyze_enabled,
};

static TEMP_SENSOR_MOCK: BlockSpec = BlockSpec {
    block_type: KnownBlockType::TempSensorMock,
    title: "Temp Sensor (Mock)",
    role: Role::Process,
    generate: || {
        BlockData::from([
            ("value", qty(Some(20.0), "degC")),
            ("connected", true.into()),
            ("fluctuations", FieldValue::List(vec![])),
        ])
    },
    fields: &[
        field("connected", "Connected", false, false),
        field("value", "Sensor value", true, true),
    ],
    analyze: analyze_active,
};

static DISPLAY_SETTINGS: BlockSpec = BlockSpec {
    block_type: KnownBlockType::DisplaySettings,
    title: "Display Settings",
    role: Role::Display,
    generate: || {
        BlockData::from([
            ("widgets", FieldValue::List(vec![])),
            ("name", "".into()),
            ("brightness", 0i64.into()),
        ])
    },
    fields: &[],
    analyze: analyze_active,
};

/// Registry lookup; `None` for types without a registered spec
pub fn block_spec(block_type: &KnownBlockType) -> Option<&'static BlockSpec> {
    use KnownBlockType as K;
    match block_type {
        K::Balancer => Some(&BALANCER),
        K::Mutex => Some(&MUTEX),
        K::MotorValve => Some(&MOTOR_VALVE),
        K::DigitalActuator => Some(&DIGITAL_ACTUATOR),
        K::ActuatorAnalogMock => Some(&ACTUATOR_ANALOG_MOCK),
        K::ActuatorPwm => Some(&ACTUATOR_PWM),
        K::ActuatorOffset => Some(&ACTUATOR_OFFSET),
        K::Pid => Some(&PID),
        K::SetpointSensorPair => Some(&SETPOINT_SENSOR_PAIR),
        K::TempSensorExternal => Some(&TEMP_SENSOR_EXTERNAL),
        K::TempSensorMock => Some(&TEMP_SENSOR_MOCK),
        K::DisplaySettings => Some(&DISPLAY_SETTINGS),
        _ => None,
    }
}

/// Builds a block of the given type filled with the registry defaults.
pub fn generate_block(service_id: &str, id: &str, block_type: KnownBlockType) -> Block {
    let data = block_spec(&block_type)
        .map(|spec| (spec.generate)())
        .unwrap_or_default();
    Block::new(service_id, id, block_type.into(), data)
}

/// Status of a block according to its type's analyzer
pub fn analyze_block(block: &Block) -> BlockStatus {
    block
        .block_type
        .spec()
        .map(|spec| (spec.analyze)(block))
        .unwrap_or(BlockStatus::Active)
}

/// Numeric values of the fields a block's type marks as graphed, in field table order
pub fn graphed_values(block: &Block) -> Vec<(&'static str, f64)> {
    let Some(spec) = block.block_type.spec() else {
        return Vec::new();
    };
    spec.graphed_fields()
        .filter_map(|f| {
            block
                .data
                .get(f.key)
                .and_then(FieldValue::as_f64)
                .map(|v| (f.key, v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_types_are_kept() {
        let t = BlockType::from("FancyNewBlock");
        assert_eq!(t, BlockType::Other("FancyNewBlock".into()));
        assert_eq!(t.name(), "FancyNewBlock");
        assert!(t.spec().is_none());
    }

    #[test]
    fn interface_names_parse_before_block_names() {
        let parsed: BlockOrIntfType = "TempSensorInterface".parse().unwrap();
        assert_eq!(parsed, BlockOrIntfType::Intf(BlockIntfType::TempSensorInterface));

        let parsed: BlockOrIntfType = "Pid".parse().unwrap();
        assert_eq!(parsed, BlockOrIntfType::from(KnownBlockType::Pid));
    }

    #[test]
    fn satisfies_exact_and_interface() {
        let pair = BlockType::from(KnownBlockType::SetpointSensorPair);
        assert!(pair.satisfies(&KnownBlockType::SetpointSensorPair.into()));
        assert!(pair.satisfies(&BlockIntfType::ProcessValueInterface.into()));
        assert!(!pair.satisfies(&BlockIntfType::TempSensorInterface.into()));
        assert!(!pair.satisfies(&KnownBlockType::Pid.into()));
    }

    #[test]
    fn generated_pid_has_driven_output() {
        let block = generate_block("spark-one", "pid-1", KnownBlockType::Pid);
        let output = block.data.get("outputId").and_then(FieldValue::as_link).unwrap();
        assert!(output.driven);
        assert!(output.target().is_none());
        assert_eq!(analyze_block(&block), BlockStatus::Disabled);
    }

    #[test]
    fn constraint_roles() {
        assert_eq!(BlockType::from("Balancer").spec().map(|s| s.role), Some(Role::Constraint));
        assert_eq!(BlockType::from("Mutex").spec().map(|s| s.role), Some(Role::Constraint));
        assert_eq!(BlockType::from("Pid").spec().map(|s| s.role), Some(Role::Control));
    }

    #[test]
    fn field_specs_describe_readonly_and_graphed_fields() {
        let spec = BlockType::from("Pid").spec().unwrap();
        let kp = spec.field("kp").unwrap();
        assert_eq!(kp.title, "Kp");
        assert!(!kp.readonly);
        assert!(spec.field("outputValue").unwrap().readonly);
        assert!(spec.field("missing").is_none());

        let graphed: Vec<&str> = spec.graphed_fields().map(|f| f.key).collect();
        assert!(graphed.contains(&"outputValue"));
        assert!(!graphed.contains(&"kp"));
    }

    #[test]
    fn graphed_values_read_numeric_fields() {
        let mut block = generate_block("spark-one", "sensor-1", KnownBlockType::TempSensorExternal);
        block.data.insert("value", Quantity::new(21.5, "degC"));

        assert_eq!(graphed_values(&block), vec![("value", 21.5)]);

        let other = Block::new("spark-one", "x", BlockType::from("FancyNewBlock"), BlockData::new());
        assert!(graphed_values(&other).is_empty());
    }
}
