use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomParams {
    pub initial_temp_c: f64,
    pub ambient_temp_c: f64,
    /// Lumped thermal capacitance of air, racks and structure (kJ/°C).
    pub thermal_mass_kj_per_c: f64,
    /// Envelope conductance to the surroundings (kW/°C).
    pub ua_kw_per_c: f64,
    pub it_load_kw: f64,
}

impl RoomParams {
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !(self.thermal_mass_kj_per_c.is_finite() && self.thermal_mass_kj_per_c > 0.0) {
            out.push(format!(
                "room.thermal_mass_kj_per_c must be > 0 (got {})",
                self.thermal_mass_kj_per_c
            ));
        }
        if !(self.ua_kw_per_c.is_finite() && self.ua_kw_per_c >= 0.0) {
            out.push(format!("room.ua_kw_per_c must be >= 0 (got {})", self.ua_kw_per_c));
        }
        if !(self.it_load_kw.is_finite() && self.it_load_kw >= 0.0) {
            out.push(format!("room.it_load_kw must be >= 0 (got {})", self.it_load_kw));
        }
        for (name, v) in [
            ("room.initial_temp_c", self.initial_temp_c),
            ("room.ambient_temp_c", self.ambient_temp_c),
        ] {
            if !v.is_finite() {
                out.push(format!("{name} must be finite (got {v})"));
            }
        }
        out
    }
}

/// Single-zone data hall.
#[derive(Clone, Debug)]
pub struct Room {
    pub temp_c: f64,
    pub ambient_temp_c: f64,
    pub it_load_kw: f64,
    thermal_mass_kj_per_c: f64,
    ua_kw_per_c: f64,
    cooling_energy_kwh: f64,
    it_energy_kwh: f64,
}

impl Room {
    pub fn new(p: &RoomParams) -> Self {
        Self {
            temp_c: p.initial_temp_c,
            ambient_temp_c: p.ambient_temp_c,
            it_load_kw: p.it_load_kw,
            thermal_mass_kj_per_c: p.thermal_mass_kj_per_c,
            ua_kw_per_c: p.ua_kw_per_c,
            cooling_energy_kwh: 0.0,
            it_energy_kwh: 0.0,
        }
    }

    /// Heat exchanged with the surroundings, positive into the room (kW).
    pub fn envelope_gain_kw(&self) -> f64 {
        self.ua_kw_per_c * (self.ambient_temp_c - self.temp_c)
    }

    /// Explicit Euler step of the heat balance:
    /// C * dT/dt = Q_it + UA * (T_ambient - T) - Q_cooling
    pub fn step(&mut self, cooling_kw: f64, dt_s: f64) {
        let q_net = self.it_load_kw + self.envelope_gain_kw() - cooling_kw;
        self.temp_c += q_net / self.thermal_mass_kj_per_c * dt_s;

        let dt_h = dt_s / 3600.0;
        self.cooling_energy_kwh += cooling_kw * dt_h;
        self.it_energy_kwh += self.it_load_kw * dt_h;
    }

    pub fn cooling_energy_kwh(&self) -> f64 {
        self.cooling_energy_kwh
    }

    pub fn it_energy_kwh(&self) -> f64 {
        self.it_energy_kwh
    }
}
