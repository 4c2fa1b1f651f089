#![no_main]

use db_helpers::dsn::MySqlDsn;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(dsn) = input.parse::<MySqlDsn>() {
        let _ = dsn.host_port();
        let _ = dsn.to_string().parse::<MySqlDsn>();
    }
});
