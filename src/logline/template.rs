//! `log_line_prefix` 模板编译
//!
//! 将运维配置的前缀模板（例如 `%t [%p]: [%l-1] user=%u,db=%d %r`）编译为
//! 一个正则表达式，以及语义字段到捕获组序号的映射。

use regex::Regex;

const TIMESTAMP_WITH_FRACTION: &str =
    r"(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d+ [\-+]?\w+)";
const TIMESTAMP: &str = r"(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2} [\-+]?\w+)";
const INT: &str = r"(\d+)";
const INT_WITH_SLASH: &str = r"(\d+/\d+)?";
const STRING: &str = r"(\S*)";
const STRING_WITH_SPACE: &str = r"([\w ]+)";
const STRING_WITH_DOT: &str = r"(\w+\.\w+)?";
const HOST: &str = r"(\S+)?";
const HOST_WITH_PORT: &str = r"(\S+\(.*?\))?";
const ERROR_CODE: &str = r"(\w{5})";

/// 已知的日志级别，紧跟一个冒号
pub const LEVELS: &str = "(DEBUG5|DEBUG4|DEBUG3|DEBUG2|DEBUG1|INFO|NOTICE|LOG|\
                          WARNING|ERROR|FATAL|PANIC|DETAIL|HINT|STATEMENT|\
                          CONTEXT|LOCATION):";
const MESSAGE: &str = r"\s+(.*)$";

/// 前缀中可识别的占位符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// `%m` 带小数秒的时间戳
    TimestampMillis,
    /// `%t` 时间戳
    Timestamp,
    /// `%s` 会话开始时间
    SessionStart,
    /// `%p` 进程号
    ProcessId,
    /// `%u` 用户名
    User,
    /// `%d` 数据库名
    Database,
    /// `%a` 应用名
    Application,
    /// `%h` 客户端主机
    Host,
    /// `%r` 客户端主机（带端口）
    HostWithPort,
    /// `%v` 虚拟事务号
    VirtualTxn,
    /// `%l` 会话内行号
    SessionLine,
    /// `%e` SQLSTATE 错误码
    ErrorCode,
    /// `%x` 事务号
    TxnId,
    /// `%c` 会话号
    SessionId,
    /// `%b` 后端类型
    BackendType,
}

impl Token {
    /// 根据占位符的第二个字符识别 token
    pub fn from_char(c: char) -> Option<Self> {
        let token = match c {
            'm' => Token::TimestampMillis,
            't' => Token::Timestamp,
            's' => Token::SessionStart,
            'p' => Token::ProcessId,
            'u' => Token::User,
            'd' => Token::Database,
            'a' => Token::Application,
            'h' => Token::Host,
            'r' => Token::HostWithPort,
            'v' => Token::VirtualTxn,
            'l' => Token::SessionLine,
            'e' => Token::ErrorCode,
            'x' => Token::TxnId,
            'c' => Token::SessionId,
            'b' => Token::BackendType,
            _ => return None,
        };
        Some(token)
    }

    fn fragment(self) -> &'static str {
        match self {
            Token::TimestampMillis => TIMESTAMP_WITH_FRACTION,
            Token::Timestamp | Token::SessionStart => TIMESTAMP,
            Token::ProcessId | Token::SessionLine | Token::TxnId => INT,
            Token::User | Token::Database | Token::Application => STRING,
            Token::Host => HOST,
            Token::HostWithPort => HOST_WITH_PORT,
            Token::VirtualTxn => INT_WITH_SLASH,
            Token::ErrorCode => ERROR_CODE,
            Token::SessionId => STRING_WITH_DOT,
            Token::BackendType => STRING_WITH_SPACE,
        }
    }
}

/// 语义字段到捕获组序号的映射
///
/// 模板中未出现的字段为 `None`。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldIndex {
    pub time: Option<usize>,
    pub process_id: Option<usize>,
    pub session_line: Option<usize>,
    pub user: Option<usize>,
    pub database: Option<usize>,
    pub application: Option<usize>,
    pub host: Option<usize>,
    pub virtual_txn: Option<usize>,
    pub txn_id: Option<usize>,
    pub error_code: Option<usize>,
    pub session_id: Option<usize>,
    pub backend_type: Option<usize>,
    /// 日志级别所在的捕获组，消息正文紧随其后
    pub level: usize,
}

impl FieldIndex {
    fn assign(&mut self, token: Token, group: usize) {
        let slot = match token {
            Token::TimestampMillis | Token::Timestamp | Token::SessionStart => {
                &mut self.time
            }
            Token::ProcessId => &mut self.process_id,
            Token::SessionLine => &mut self.session_line,
            Token::User => &mut self.user,
            Token::Database => &mut self.database,
            Token::Application => &mut self.application,
            Token::Host | Token::HostWithPort => &mut self.host,
            Token::VirtualTxn => &mut self.virtual_txn,
            Token::TxnId => &mut self.txn_id,
            Token::ErrorCode => &mut self.error_code,
            Token::SessionId => &mut self.session_id,
            Token::BackendType => &mut self.backend_type,
        };
        *slot = Some(group);
    }

    /// 消息正文所在的捕获组
    pub fn description(&self) -> usize {
        self.level + 1
    }
}

/// 编译后的前缀模板
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regex: Regex,
    index: FieldIndex,
    tokens: Vec<Token>,
}

impl CompiledPattern {
    /// 编译前缀模板
    ///
    /// 未识别的占位符会被丢弃，不产生捕获组；`%q` 打开一个非捕获的可选组，
    /// 在模板末尾统一闭合。没有任何可识别占位符的模板依然可以编译，
    /// 只是除了级别和消息之外的字段都无法解析。
    pub fn compile(template: &str) -> Result<Self, regex::Error> {
        let mut body = String::with_capacity(template.len() * 4);
        let mut index = FieldIndex::default();
        let mut tokens = Vec::new();
        let mut optional = false;
        // 第 1 组为前导空白
        let mut group = 2;

        let mut chars = template.chars().peekable();
        let mut literal = [0u8; 4];
        while let Some(c) = chars.next() {
            if c != '%' {
                body.push_str(&regex::escape(c.encode_utf8(&mut literal)));
                continue;
            }
            let Some(&next) = chars.peek() else {
                // 末尾孤立的 `%` 按字面量处理
                body.push('%');
                break;
            };
            chars.next();

            if next == 'q' {
                body.push_str("(?:");
                optional = true;
                continue;
            }

            let Some(token) = Token::from_char(next) else {
                tracing::debug!("忽略未识别的前缀占位符: %{}", next);
                continue;
            };

            body.push_str(token.fragment());
            index.assign(token, group);
            tokens.push(token);
            group += 1;
        }

        if optional {
            body.push_str(")?");
        }

        // 语义捕获数 + 前导空白 + 尾随空白 + 1
        index.level = tokens.len() + 3;

        let pattern = format!(r"(\s*){body}(\s*){LEVELS}{MESSAGE}");
        tracing::debug!(template, pattern = %pattern, "前缀模板编译完成");

        Ok(Self { regex: Regex::new(&pattern)?, index, tokens })
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn index(&self) -> &FieldIndex {
        &self.index
    }

    /// 模板中出现过的占位符，按出现顺序
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// 模板是否包含某个占位符
    pub fn has_token(&self, token: Token) -> bool {
        self.tokens.contains(&token)
    }

    /// 模板是否带有客户端主机字段（`%h` 或 `%r`）
    pub fn has_host(&self) -> bool {
        self.index.host.is_some()
    }

    /// 模板是否带有用户字段
    pub fn has_user(&self) -> bool {
        self.index.user.is_some()
    }

    /// 模板是否带有数据库字段
    pub fn has_database(&self) -> bool {
        self.index.database.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_assigns_indexes_in_order() {
        let pattern =
            CompiledPattern::compile("%t [%p]: [%l-1] user=%u,db=%d %r")
                .unwrap();
        let index = pattern.index();
        assert_eq!(index.time, Some(2));
        assert_eq!(index.process_id, Some(3));
        assert_eq!(index.session_line, Some(4));
        assert_eq!(index.user, Some(5));
        assert_eq!(index.database, Some(6));
        assert_eq!(index.host, Some(7));
        assert_eq!(index.level, 9);
        assert_eq!(index.description(), 10);
        assert_eq!(index.application, None);
        assert_eq!(index.error_code, None);
    }

    #[test]
    fn test_unknown_tokens_are_dropped() {
        let pattern = CompiledPattern::compile("%Z %u %%").unwrap();
        assert_eq!(pattern.tokens(), &[Token::User]);
        assert_eq!(pattern.index().user, Some(2));
        assert_eq!(pattern.index().level, 4);
    }

    #[test]
    fn test_literals_are_escaped() {
        let pattern = CompiledPattern::compile("[%p] (x) ").unwrap();
        assert!(pattern.regex().is_match("[12] (x) LOG:  hello"));
        assert!(!pattern.regex().is_match("12 x LOG:  hello"));
    }

    #[test]
    fn test_optional_group() {
        let pattern = CompiledPattern::compile("%p %q%u@%d ").unwrap();
        assert!(pattern.regex().is_match("42 alice@app LOG:  hi"));
        assert!(pattern.regex().is_match("42 LOG:  hi"));
    }

    #[test]
    fn test_template_without_tokens_still_compiles() {
        let pattern = CompiledPattern::compile("plain text ").unwrap();
        assert!(pattern.tokens().is_empty());
        assert_eq!(pattern.index().level, 3);
        assert!(pattern.regex().is_match("plain text LOG:  message"));
    }

    #[test]
    fn test_trailing_percent_is_literal() {
        let pattern = CompiledPattern::compile("%p %").unwrap();
        assert!(pattern.regex().is_match("7 % ERROR:  oops"));
    }
}
