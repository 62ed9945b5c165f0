//! Account directory: maps a role name to the account it lives on.
//!
//! The CSV file has a header row naming at least the `account`, `platform`,
//! `servername` and `rolename` columns, in any order. Extra columns are
//! ignored.

use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Where a role lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub account: String,
    pub platform: String,
    pub servername: String,
}

/// Lookup of role identities.
pub trait AccountDirectory: Send + Sync {
    /// First entry for `rolename`, `None` if unknown.
    fn find_role(&self, rolename: &str) -> Option<RoleInfo>;

    /// Every non-empty role name, in file order.
    fn all_rolenames(&self) -> Vec<String>;
}

/// One data row.
#[derive(Debug, Clone)]
struct AccountRow {
    rolename: String,
    info: RoleInfo,
}

/// Column positions of the required fields.
struct Columns {
    account: usize,
    platform: usize,
    servername: usize,
    rolename: usize,
}

impl Columns {
    fn from_header(header: &str) -> Result<Self> {
        let names: Vec<&str> = header
            .split(',')
            .map(|s| s.trim().trim_start_matches('\u{feff}'))
            .collect();
        let find = |wanted: &str| {
            names
                .iter()
                .position(|n| *n == wanted)
                .ok_or_else(|| anyhow!("Missing column: {}", wanted))
        };
        Ok(Self {
            account: find("account")?,
            platform: find("platform")?,
            servername: find("servername")?,
            rolename: find("rolename")?,
        })
    }

    fn parse_line(&self, line: &str) -> Result<AccountRow> {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        let field = |index: usize| {
            parts
                .get(index)
                .map(|s| s.to_string())
                .ok_or_else(|| {
                    anyhow!("Expected at least {} columns, got {}", index + 1, parts.len())
                })
        };
        Ok(AccountRow {
            rolename: field(self.rolename)?,
            info: RoleInfo {
                account: field(self.account)?,
                platform: field(self.platform)?,
                servername: field(self.servername)?,
            },
        })
    }
}

/// `AccountDirectory` reading a CSV file on every lookup, so edits to the
/// file apply without restarting the agent.
#[derive(Debug, Clone)]
pub struct CsvAccountDirectory {
    path: PathBuf,
}

impl CsvAccountDirectory {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every well-formed row. Malformed rows are skipped with a warning.
    fn read_rows(&self) -> Result<Vec<AccountRow>> {
        let file = File::open(&self.path)
            .context(format!("Failed to open account file: {}", self.path.display()))?;
        let mut lines = BufReader::new(file).lines();

        let header = lines
            .next()
            .ok_or_else(|| anyhow!("Account file is empty"))?
            .context("Failed to read account file header")?;
        let columns = Columns::from_header(&header)?;

        let mut rows = Vec::new();
        for (line_num, line_result) in lines.enumerate() {
            let line = line_result.context("Failed to read line from account file")?;
            if line.trim().is_empty() {
                continue;
            }
            match columns.parse_line(&line) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    crate::log(&format!(
                        "Warning: Skipping malformed account row {}: {}",
                        line_num + 2,
                        e
                    ));
                }
            }
        }
        Ok(rows)
    }

    /// Rows of the file, or none if it cannot be read.
    fn rows(&self) -> Vec<AccountRow> {
        match self.read_rows() {
            Ok(rows) => rows,
            Err(e) => {
                crate::log(&format!("Error: {:#}", e));
                Vec::new()
            }
        }
    }
}

impl AccountDirectory for CsvAccountDirectory {
    fn find_role(&self, rolename: &str) -> Option<RoleInfo> {
        self.rows()
            .into_iter()
            .find(|row| row.rolename == rolename)
            .map(|row| row.info)
    }

    fn all_rolenames(&self) -> Vec<String> {
        self.rows()
            .into_iter()
            .map(|row| row.rolename)
            .filter(|name| !name.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn directory(content: &str) -> (NamedTempFile, CsvAccountDirectory) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let directory = CsvAccountDirectory::new(file.path().to_path_buf());
        (file, directory)
    }

    #[test]
    fn test_find_role_any_column_order() {
        let (_file, accounts) = directory(
            "rolename,servername,platform,account,note\n\
             Alice,S1,android,a@example.com,main\n\
             Bob,S2,ios,b@example.com,\n\
             Alice,S9,ios,other@example.com,dup\n",
        );

        assert_eq!(
            accounts.find_role("Alice"),
            Some(RoleInfo {
                account: "a@example.com".to_string(),
                platform: "android".to_string(),
                servername: "S1".to_string(),
            })
        );
        assert_eq!(accounts.find_role("Bob").unwrap().servername, "S2");
        assert!(accounts.find_role("Carol").is_none());
    }

    #[test]
    fn test_all_rolenames_skips_blank() {
        let (_file, accounts) = directory(
            "account,platform,servername,rolename\n\
             a,android,S1,Alice\n\
             \n\
             b,ios,S2,\n\
             c,ios,S3,Carol\n\
             broken\n",
        );

        assert_eq!(accounts.all_rolenames(), vec!["Alice", "Carol"]);
    }

    #[test]
    fn test_missing_file_or_column() {
        let accounts = CsvAccountDirectory::new(PathBuf::from("/nonexistent/accounts.csv"));
        assert!(accounts.find_role("Alice").is_none());
        assert!(accounts.all_rolenames().is_empty());

        let (_file, accounts) = directory("account,platform,rolename\na,android,Alice\n");
        assert!(accounts.find_role("Alice").is_none());
    }
}
