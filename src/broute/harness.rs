// セッションの試験用
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::broute::{Session, State, Step};
use crate::clock::ManualClock;
use crate::connection_settings::ConnectionSettings;
use crate::sensor::RecordingSink;
use crate::transport::ScriptedTransport;

pub const ID: &str = "0123456789ABCDEF0123456789ABCDEF";
pub const PASSWORD: &str = "PASSWORD1234";
pub const METER_ADDRESS: &str = "FE80:0000:0000:0000:021C:6400:03A1:B2C3";
pub const LOCAL_ADDRESS: &str = "FE80:0000:0000:0000:021D:1290:0003:C890";

pub fn settings() -> ConnectionSettings {
    ConnectionSettings {
        route_b_id: Some(ID.into()),
        route_b_password: Some(PASSWORD.into()),
        ..Default::default()
    }
}

/// スマートメーターからの ERXUDP 行
pub fn rxudp(payload: &str) -> String {
    format!(
        "ERXUDP {METER_ADDRESS} {LOCAL_ADDRESS} 0E1A 0E1A 001C640003A1B2C3 1 {:04X} {payload}",
        payload.len() / 2
    )
}

/// 瞬時電力の Get_Res
pub fn power_response(watt: i32) -> String {
    rxudp(&format!("1081000002880105FF017201E704{watt:08X}"))
}

pub struct Harness {
    pub session: Session<ScriptedTransport, ManualClock>,
    pub port: ScriptedTransport,
    pub clock: ManualClock,
    pub power: RecordingSink,
    pub energy: RecordingSink,
}

impl Harness {
    pub fn new(settings: ConnectionSettings) -> Self {
        let mut h = Self::without_sensors(settings);
        h.session = h
            .session
            .with_power_sensor(Box::new(h.power.clone()))
            .with_energy_sensor(Box::new(h.energy.clone()));
        h
    }

    pub fn without_sensors(settings: ConnectionSettings) -> Self {
        let port = ScriptedTransport::new();
        let clock = ManualClock::new(10_000);
        Self {
            session: Session::new(port.clone(), clock.clone(), &settings),
            port,
            clock,
            power: RecordingSink::new(),
            energy: RecordingSink::new(),
        }
    }

    /// 1行受信させて1周まわす
    pub fn feed(&mut self, line: &str) -> Step {
        self.port.push_line(line);
        self.session.run_loop()
    }

    /// 接続まで進める
    pub fn bring_up(&mut self) {
        self.session.setup().unwrap();
        self.session.run_loop();
        let scan_done = format!("EVENT 20 {METER_ADDRESS}");
        let joined = format!("EVENT 25 {METER_ADDRESS}");
        for line in [
            "EVER 1.2.10",
            "OK",
            "OK 00",
            "OK",
            "OK",
            "OK",
            "  Channel:21",
            "  Pan ID:8888",
            "  Addr:001C640003A1B2C3",
            scan_done.as_str(),
            METER_ADDRESS,
            "OK",
            "OK",
            joined.as_str(),
        ] {
            self.feed(line);
        }
        assert_eq!(self.session.state(), State::Running);
        self.port.take_written();
    }
}
