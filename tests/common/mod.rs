#![allow(dead_code)]

/// Base-91 encode `value` into `width` digit characters, most significant
/// first, the way the controller packs its fields.
pub fn encode(value: u64, width: usize) -> String {
    (0..width)
        .rev()
        .map(|z| {
            let digit = value / 91u64.pow(z as u32) % 91;
            char::from_u32(digit as u32 + 35).unwrap()
        })
        .collect()
}

pub fn encode_all(fields: &[(u64, usize)]) -> String {
    fields.iter().map(|&(value, width)| encode(value, width)).collect()
}

/// Escape text for a double-quoted literal in the page source.
pub fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

pub const CELLS: [u64; 8] = [3310, 3313, 3312, 3311, 3310, 3308, 3307, 3308];
pub const ENERGY_WH: [u64; 7] = [3980567, 7250438, 0, 0, 0, 2569127, 3955655];
pub const ENERGY_AH: [u64; 7] = [14945571, 26846452, 0, 0, 0, 9567035, 14852170];

pub struct Factory;

impl Factory {
    /// Controller state at 2024-02-20 13:32:56: discharging at 5.252A with
    /// both FETs on and cell 6 balancing.
    pub fn sbms() -> String {
        Self::sbms_with(-5252, 20480)
    }

    pub fn sbms_with(battery_current_ma: i64, status: u64) -> String {
        let mut s = encode_all(&[(24, 1), (2, 1), (20, 1), (13, 1), (32, 1), (56, 1), (69, 2)]);
        for mv in CELLS {
            s += &encode(mv, 2);
        }
        s += &encode_all(&[(710, 2), (0, 2)]);
        s.push(if battery_current_ma < 0 { '-' } else { '+' });
        s += &encode(battery_current_ma.unsigned_abs(), 3);
        s += &encode_all(&[(39, 3), (0, 3), (5234, 3)]);
        s += &encode_all(&[(0, 3), (0, 3), (0, 3), (0, 3), (11457, 3)]);
        s += &encode(status, 3);
        // trailing fields the decoder does not read
        s += &encode_all(&[(0, 3); 4]);
        s
    }

    pub fn xsbms() -> String {
        encode_all(&[(0, 3), (3750, 2), (2500, 2), (1, 1), (280, 3), (0, 3)])
    }

    pub fn e_w() -> String {
        ENERGY_WH.iter().map(|&v| encode(v, 6)).collect()
    }

    pub fn e_a() -> String {
        ENERGY_AH.iter().map(|&v| encode(v, 6)).collect()
    }

    pub fn s2() -> &'static str {
        "[0,0,0,0,0,1,0,0]"
    }

    pub fn raw_data() -> String {
        Self::page(&quote(&Self::sbms()), Self::s2())
    }

    /// A `/rawData` body shaped like the firmware's: a script block with the
    /// literals spread over several lines, some sharing a line.
    pub fn page(sbms: &str, s2: &str) -> String {
        format!(
            "<html><head><meta charset=\"utf-8\"></head><body><script>\n\
             var sbms={};var s1=['Battery','PV1+PV2','Load','ExtLd','PV1','PV2','Heat1','Heat2'];\n\
             var s2={};\n\
             var eW={};\n\
             var eA={};\n\
             var xsbms={};\n\
             </script></body></html>\n",
            sbms,
            s2,
            quote(&Self::e_w()),
            quote(&Self::e_a()),
            quote(&Self::xsbms()),
        )
    }

    pub fn task_report() -> &'static str {
        "loopTask\t\tRUN\t1\t414155237\t\t18%\n\
         async_tcp\tRDY\t3\t737905955\t32%\n\
         IDLE0\t\tRDY\t0\t3402661223\t\t150%\n\
         IDLE1\t\tRDY\t0\t2251204466\t\t99%\n\
         Tmr Svc\t\tBLK\t1\t68\t\t<1%\n\
         ipc1\t\tSUS\t24\t51640\t\t<1%\n\
         \n"
    }
}
