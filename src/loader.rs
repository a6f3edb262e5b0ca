//! token / 代理列表加载
//!
//! 每行一条，首尾空白去除，空行忽略

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// 按行读取文件；文件不存在时返回空列表
pub fn read_lines<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<String>> {
    let path = path.as_ref();
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("文件不存在: {:?}", path);
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// 加载 token 列表
pub fn load_tokens<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<String>> {
    read_lines(path)
}

/// 加载代理列表，缺少协议前缀的条目补全为 `http://`
pub fn load_proxies<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<String>> {
    Ok(read_lines(path)?
        .into_iter()
        .map(|line| normalize_proxy(&line))
        .collect())
}

/// `host:port` / `user:pass@host:port` 默认按 HTTP 代理处理
pub fn normalize_proxy(line: &str) -> String {
    if line.contains("://") {
        line.to_string()
    } else {
        format!("http://{}", line)
    }
}
