//! 环形母线微电网模型
//!
//! SCADA 输入名、枚举取值与标幺换算, 以及所有场景共用的默认初值。

use atp_executor::{Result, SetInputEvent, SimulationDriver};
use std::fmt;

// ============================================
// 柴油发电机组
// ============================================

pub const GEN_CTRL_MODE: &str = "DG_in.Gen_Control_Mode";
pub const GEN_ON: &str = "DG_in.Gen_On";
pub const GEN_OP_MODE: &str = "DG_in.Gen_OP_mode";
pub const GEN_PF_REF: &str = "DG_in.pf_ref";
pub const GEN_PREF: &str = "DG_in.Pref";
pub const GEN_VREF: &str = "DG_in.Vref";
pub const GEN_WREF: &str = "DG_in.wref";

/// 机组基准容量 (kVA)
pub const GEN_SB: f64 = 8.619e3;
/// 机组额定转速 (rpm), 60 Hz 四对极
pub const GEN_WB: f64 = 60.0 * 60.0 / 4.0;
/// 机端基准电压 (V)
pub const GEN_VTB: f64 = 13.8e3;

/// 机组控制模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenControlMode {
    Vf,
    Pv,
    PRef,
}

impl GenControlMode {
    pub fn value(self) -> f64 {
        match self {
            GenControlMode::Vf => 0.0,
            GenControlMode::Pv => 1.0,
            GenControlMode::PRef => 2.0,
        }
    }
}

/// 机组运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenOpMode {
    Standby,
    GridFollowing,
    GridForming,
}

impl GenOpMode {
    pub fn value(self) -> f64 {
        match self {
            GenOpMode::Standby => 0.0,
            GenOpMode::GridFollowing => 1.0,
            GenOpMode::GridForming => 2.0,
        }
    }
}

/// 转速 (rpm) 换算为标幺值
pub fn gen_wref(rpm: f64) -> f64 {
    rpm / GEN_WB
}

/// 有功 (kW) 换算为标幺值
pub fn gen_pref(kw: f64) -> f64 {
    kw / GEN_SB
}

/// 机端电压 (V) 换算为标幺值
pub fn gen_vref(volts: f64) -> f64 {
    volts / GEN_VTB
}

/// 功率因数参考, 超前为负
pub fn gen_pf_ref(pf: f64, leading: bool) -> f64 {
    if leading {
        -pf
    } else {
        pf
    }
}

// ============================================
// 光伏
// ============================================

pub const PV_CONNECT: &str = "PV_in.Connect";
pub const PV_ENABLE: &str = "PV_in.Enable";
pub const PV_IRRADIATION: &str = "PV_in.Irradiation";
pub const PV_Q_MODE: &str = "PV_in.Q_mode";
pub const PV_QREF: &str = "PV_in.Q_ref";
pub const PV_VREF: &str = "PV_in.V_ref";

// ============================================
// 储能
// ============================================

pub const ESS_FREF: &str = "Batt_in.f_ref";
pub const ESS_ON: &str = "Batt_in.On";
pub const ESS_OP_MODE: &str = "Batt_in.mode";
pub const ESS_PREF: &str = "Batt_in.Pref";
pub const ESS_QREF: &str = "Batt_in.Qref";
pub const ESS_VREF: &str = "Batt_in.Vref";

/// 储能运行模式取值
pub const ESS_GRID_FORMING: f64 = 0.0;
pub const ESS_GRID_FOLLOWING: f64 = 1.0;

// ============================================
// 开关与故障
// ============================================

pub const SW_F3L1_CTRL: &str = "SW_F3L1_Ctrl";
pub const SW_F3L2_CTRL: &str = "SW_F3L2_Ctrl";
pub const SW_F4L1_CTRL: &str = "SW_F4L1_Ctrl";
pub const SW_F4L2_CTRL: &str = "SW_F4L2_Ctrl";

/// 负荷开关
pub const LOAD_SWITCHES: [&str; 4] = [SW_F3L1_CTRL, SW_F3L2_CTRL, SW_F4L1_CTRL, SW_F4L2_CTRL];

/// 馈线上的分段开关, 默认全部闭合
pub const FEEDER_SWITCHES: [&str; 8] = [
    "SW_F3L1_Gen_Ctrl",
    "SW_F3L1_ESS_Ctrl",
    "SW_F3L2_Gen_Ctrl",
    "SW_F3L2_ESS_Ctrl",
    "SW_F4L1_Gen_Ctrl",
    "SW_F4L1_ESS_Ctrl",
    "SW_F4L2_Gen_Ctrl",
    "SW_F4L2_ESS_Ctrl",
];

/// 环网角点开关, 默认全部闭合
pub const CORNER_SWITCHES: [&str; 4] = [
    "SW_F3_Gen_Ctrl",
    "SW_F4_Gen_Ctrl",
    "SW_F3_ESS_Ctrl",
    "SW_F4_ESS_Ctrl",
];

pub const SWITCH_OFF: f64 = 0.0;
pub const SWITCH_ON: f64 = 1.0;

pub const FAULT_CTRL: &str = "Fault_Ctrl";

/// 故障指示输出
pub const FAULT_INDICATOR: &str = "Fault_Indicator";
pub const FAULT_CTRL_VALUE: &str = "Fault_Ctrl_Value";

/// 故障类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultType {
    None,
    AB,
    AC,
    ABC,
    AGnd,
    ABGnd,
    ACGnd,
    ABCGnd,
}

impl FaultType {
    /// 全部故障类型, 不含 `None`
    pub const ALL: [FaultType; 7] = [
        FaultType::AB,
        FaultType::AC,
        FaultType::ABC,
        FaultType::AGnd,
        FaultType::ABGnd,
        FaultType::ACGnd,
        FaultType::ABCGnd,
    ];

    /// 写入 `Fault_Ctrl` 的取值
    pub fn value(self) -> f64 {
        match self {
            FaultType::None => 0.0,
            FaultType::AB => 1.0,
            FaultType::AC => 2.0,
            FaultType::ABC => 3.0,
            FaultType::AGnd => 4.0,
            FaultType::ABGnd => 5.0,
            FaultType::ACGnd => 6.0,
            FaultType::ABCGnd => 7.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FaultType::None => "None",
            FaultType::AB => "A-B",
            FaultType::AC => "A-C",
            FaultType::ABC => "A-B-C",
            FaultType::AGnd => "A-Gnd",
            FaultType::ABGnd => "A-B-Gnd",
            FaultType::ACGnd => "A-C-Gnd",
            FaultType::ABCGnd => "A-B-C-Gnd",
        }
    }

    /// 按标签查找, 大小写不敏感
    pub fn from_label(label: &str) -> Option<Self> {
        std::iter::once(FaultType::None)
            .chain(FaultType::ALL)
            .find(|fault| fault.label().eq_ignore_ascii_case(label.trim()))
    }
}

impl fmt::Display for FaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================
// 信号
// ============================================

/// 采样率 (Hz)
pub const SAMPLE_FREQUENCY: f64 = 3.84e3;

/// 测量数据块
pub const DATA_BLOCK_NAMES: [&str; 8] = [
    "Data_F3_Gen",
    "Data_F3L1_Gen",
    "Data_F3L1_ESS",
    "Data_F3_ESS",
    "Data_F4_Gen",
    "Data_F4L2_Gen",
    "Data_F4L2_ESS",
    "Data_F4_ESS",
];

/// 每个数据块内的信号
pub const DATA_BLOCK_SIGNALS: [&str; 11] = [
    "Va_inst", "Vb_inst", "Vc_inst", "Ia_inst", "Ib_inst", "Ic_inst", "Sp", "Sn", "Sz", "f", "wt",
];

/// 数据记录器的完整信号列表: 故障指示加各数据块信号
pub fn streaming_signals() -> Vec<String> {
    let mut signals = vec![FAULT_INDICATOR.to_string(), FAULT_CTRL_VALUE.to_string()];
    for block in DATA_BLOCK_NAMES {
        signals.extend(
            DATA_BLOCK_SIGNALS
                .iter()
                .map(|signal| format!("{}.{}", block, signal)),
        );
    }
    signals
}

// ============================================
// 默认初值
// ============================================

/// 场景开始前的默认 SCADA 输入
///
/// 所有电源停机, 无故障, 负荷断开, 馈线与角点开关闭合。
pub fn default_inputs() -> Vec<(&'static str, f64)> {
    let mut inputs = vec![
        (GEN_ON, 0.0),
        (GEN_CTRL_MODE, GenControlMode::Vf.value()),
        (GEN_PF_REF, gen_pf_ref(4.7, false)),
        (GEN_OP_MODE, GenOpMode::Standby.value()),
        (GEN_WREF, gen_wref(900.0)),
        (GEN_PREF, gen_pref(1.0)),
        (GEN_VREF, gen_vref(13.8e3)),
        (PV_CONNECT, 0.0),
        (PV_ENABLE, 0.0),
        (PV_Q_MODE, 1.0),
        (PV_IRRADIATION, 100.0),
        (PV_VREF, 480.0),
        (PV_QREF, 0.0),
        (ESS_ON, 0.0),
        (ESS_OP_MODE, ESS_GRID_FOLLOWING),
        (ESS_VREF, 480.0),
        (ESS_FREF, 60.0),
        (ESS_PREF, 0.0),
        (ESS_QREF, 0.0),
        (FAULT_CTRL, FaultType::None.value()),
    ];
    inputs.extend(LOAD_SWITCHES.iter().map(|name| (*name, SWITCH_OFF)));
    inputs.extend(FEEDER_SWITCHES.iter().map(|name| (*name, SWITCH_ON)));
    inputs.extend(CORNER_SWITCHES.iter().map(|name| (*name, SWITCH_ON)));
    inputs
}

/// 立即写入默认初值
pub async fn apply_defaults(driver: &mut SimulationDriver) -> Result<()> {
    for (name, value) in default_inputs() {
        let description = format!("默认值 {} = {}", name, value);
        driver
            .invoke_now(&description, Box::new(SetInputEvent::new(name, value)))
            .await?;
    }
    Ok(())
}
