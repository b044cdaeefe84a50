use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::ConnectionTrait;

/// Command a row-level-security policy applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RlsCommand {
    Select,
    Insert,
    Update,
    Delete,
    All,
}

/// Database role a policy is granted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RlsRole {
    Public,
    Authenticated,
    /// The role behind the project's anon key, which the client uses for everything
    Anon,
    CustomRole(String),
}

#[derive(Debug, Clone)]
pub struct RlsPolicy {
    pub name: String,
    pub table: String,
    pub command: RlsCommand,
    pub role: RlsRole,
    pub using: Option<String>,
    pub check: Option<String>,
    pub schema: Option<String>,
}

impl RlsPolicy {
    /// Policy letting the anon role run `command` on every row of `table`
    pub fn anon_full_access(table: &str, command: RlsCommand) -> Self {
        let (using, check) = match command {
            RlsCommand::Insert => (None, Some("true".to_string())),
            RlsCommand::Select | RlsCommand::Delete => (Some("true".to_string()), None),
            RlsCommand::Update | RlsCommand::All => {
                (Some("true".to_string()), Some("true".to_string()))
            }
        };
        Self {
            name: format!("anon {} {}", command_sql(command).to_lowercase(), table),
            table: table.to_string(),
            command,
            role: RlsRole::Anon,
            using,
            check,
            schema: Some("public".to_string()),
        }
    }

    pub fn create_policy_sql(&self) -> String {
        let role = match &self.role {
            RlsRole::Public => "PUBLIC",
            RlsRole::Authenticated => "authenticated",
            RlsRole::Anon => "anon",
            RlsRole::CustomRole(role_name) => role_name,
        };

        // INSERT policies only take WITH CHECK
        let using_clause = match &self.using {
            Some(expr) if self.command != RlsCommand::Insert => format!(" USING ({})", expr),
            _ => String::new(),
        };
        let check_clause = match &self.check {
            Some(expr) => format!(" WITH CHECK ({})", expr),
            None => String::new(),
        };

        format!(
            "CREATE POLICY \"{}\" ON {}{} FOR {} TO {}{}{};",
            self.name,
            schema_prefix(self.schema.as_deref()),
            self.table,
            command_sql(self.command),
            role,
            using_clause,
            check_clause
        )
    }

    pub fn drop_policy_sql(&self) -> String {
        format!(
            "DROP POLICY IF EXISTS \"{}\" ON {}{};",
            self.name,
            schema_prefix(self.schema.as_deref()),
            self.table
        )
    }
}

fn command_sql(command: RlsCommand) -> &'static str {
    match command {
        RlsCommand::Select => "SELECT",
        RlsCommand::Insert => "INSERT",
        RlsCommand::Update => "UPDATE",
        RlsCommand::Delete => "DELETE",
        RlsCommand::All => "ALL",
    }
}

fn schema_prefix(schema: Option<&str>) -> String {
    match schema {
        Some(schema) => format!("{}.", schema),
        None => String::new(),
    }
}

pub fn enable_rls_sql(table: &str, schema: Option<&str>) -> String {
    format!(
        "ALTER TABLE {}{} ENABLE ROW LEVEL SECURITY;",
        schema_prefix(schema),
        table
    )
}

pub fn disable_rls_sql(table: &str, schema: Option<&str>) -> String {
    format!(
        "ALTER TABLE {}{} DISABLE ROW LEVEL SECURITY;",
        schema_prefix(schema),
        table
    )
}

/// Run raw SQL through the migration's connection
pub async fn execute_sql(manager: &SchemaManager<'_>, sql: &str) -> Result<(), DbErr> {
    manager.get_connection().execute_unprepared(sql).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anon_select_policy() {
        let policy = RlsPolicy::anon_full_access("cursos", RlsCommand::Select);
        assert_eq!(
            policy.create_policy_sql(),
            "CREATE POLICY \"anon select cursos\" ON public.cursos FOR SELECT TO anon USING (true);"
        );
        assert_eq!(
            policy.drop_policy_sql(),
            "DROP POLICY IF EXISTS \"anon select cursos\" ON public.cursos;"
        );
    }

    #[test]
    fn insert_policy_has_only_check() {
        let policy = RlsPolicy::anon_full_access("usuario_cursos", RlsCommand::Insert);
        assert_eq!(
            policy.create_policy_sql(),
            "CREATE POLICY \"anon insert usuario_cursos\" ON public.usuario_cursos FOR INSERT TO anon WITH CHECK (true);"
        );
    }

    #[test]
    fn rls_toggles() {
        assert_eq!(
            enable_rls_sql("perfiles", Some("public")),
            "ALTER TABLE public.perfiles ENABLE ROW LEVEL SECURITY;"
        );
        assert_eq!(
            disable_rls_sql("perfiles", None),
            "ALTER TABLE perfiles DISABLE ROW LEVEL SECURITY;"
        );
    }
}
