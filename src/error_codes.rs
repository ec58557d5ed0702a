//! 에러 코드 상수 정의
//!
//! CLI 종료 메시지와 로그에서 사용할 수 있도록 에러 코드를 문자열로 반환합니다.

/// Watch 시작 실패
pub const ERR_WATCH_START_FAILED: &str = "ERR_WATCH_START_FAILED";

/// 설정 값이 올바르지 않음
pub const ERR_INVALID_CONFIG: &str = "ERR_INVALID_CONFIG";

/// 파일이 제한 시간 내에 준비되지 않음
pub const ERR_READINESS_TIMEOUT: &str = "ERR_READINESS_TIMEOUT";

/// rclone 프로세스 시작 실패
pub const ERR_LAUNCH_FAILED: &str = "ERR_LAUNCH_FAILED";

/// rclone 이 0 이 아닌 코드로 종료
pub const ERR_NON_ZERO_EXIT: &str = "ERR_NON_ZERO_EXIT";

/// 연결 테스트 시간 초과
pub const ERR_TIMEOUT: &str = "ERR_TIMEOUT";

/// 파일 입출력 실패
pub const ERR_IO: &str = "ERR_IO";
