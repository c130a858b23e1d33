/// MySQL 복제 릴레이 실행 예제
///
/// 업스트림 MySQL 서버에 슬레이브로 접속해 binlog 스트림을 받아
/// 패킷 단위로 중계합니다. 연결이 끊기면 지수 백오프로 재접속합니다.
use mysql_relay::connection::{ConnectionConfig, RelayConnection};
use mysql_relay::response::GenericResponse;
use mysql_relay::util::AutoDelayer;
use std::env;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 초기화
    tracing_subscriber::fmt::init();

    // 연결 설정 (RELAY_CONFIG가 있으면 JSON 파일, 없으면 환경 변수)
    let config = match env::var("RELAY_CONFIG") {
        Ok(path) => ConnectionConfig::from_json_file(&path)?,
        Err(_) => config_from_env(),
    };

    let binlog_file = env::var("BINLOG_FILE").unwrap_or_else(|_| "mysql-bin.000001".to_string());
    let binlog_pos: u32 = env::var("BINLOG_POS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(4);

    info!("Starting MySQL relay");
    info!(
        "Upstream {}:{} (server_id {})",
        config.hostname, config.port, config.server_id
    );

    let mut delayer = AutoDelayer::new();
    loop {
        match run_relay(&config, &binlog_file, binlog_pos).await {
            Ok(()) => {
                info!("Relay stream ended, reconnecting");
                delayer.reset();
            }
            Err(e) => {
                error!("Relay failed: {}", e);
            }
        }
        delayer.delay().await;
    }
}

fn config_from_env() -> ConnectionConfig {
    ConnectionConfig {
        hostname: env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
        port: env::var("DB_PORT")
            .unwrap_or_else(|_| "3306".to_string())
            .parse()
            .unwrap_or(3306),
        username: env::var("DB_USER").unwrap_or_else(|_| "repl".to_string()),
        password: env::var("DB_PASSWORD").unwrap_or_default(),
        database: env::var("DB_NAME").ok(),
        server_id: env::var("SERVER_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1),
        timeout: std::time::Duration::from_secs(30),
    }
}

async fn run_relay(
    config: &ConnectionConfig,
    binlog_file: &str,
    binlog_pos: u32,
) -> mysql_relay::Result<()> {
    let mut conn = RelayConnection::connect(config).await?;
    info!("Connected to {}", conn.handshake().server_version);

    conn.register_slave().await?;
    info!("Registered as replica (server_id {})", config.server_id);

    conn.start_binlog_dump(binlog_file, binlog_pos, 0).await?;
    info!("Binlog dump started from {}:{}", binlog_file, binlog_pos);

    let mut event_count = 0u64;
    loop {
        let (header, payload) = conn.next_event_packet().await?;

        // EOF 패킷 (0xFE, 길이 < 9)이면 스트림 종료
        if !payload.is_empty() && payload[0] == 0xfe && payload.len() < 9 {
            info!("Received EOF packet - stream ended");
            return Ok(());
        }

        // 에러 패킷이면 서버 에러로 변환해 재연결 루프로 올린다
        if !payload.is_empty() && payload[0] == 0xff {
            return GenericResponse::parse(&payload)?.into_ok().map(|_| ());
        }

        event_count += 1;
        debug!(
            "Event packet #{}: {} bytes (seq {})",
            event_count, header.length, header.sequence
        );
    }
}
