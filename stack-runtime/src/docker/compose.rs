use stack_config::EnvironmentContext;

pub struct ComposeCommand;

impl ComposeCommand {
    /// Build `compose [--env-file <env>] -f <compose> [-f <override>] -p <project> <sub> ...`.
    pub fn build_args(ctx: &EnvironmentContext, subcommand: &str, extra_args: &[String]) -> Vec<String> {
        let mut args = vec!["compose".to_string()];
        if let Some(env_file) = &ctx.env_file {
            args.push("--env-file".to_string());
            args.push(env_file.to_string_lossy().into_owned());
        }
        args.push("-f".to_string());
        args.push(ctx.compose_file.to_string_lossy().into_owned());
        if let Some(override_file) = &ctx.override_file {
            args.push("-f".to_string());
            args.push(override_file.to_string_lossy().into_owned());
        }
        args.push("-p".to_string());
        args.push(ctx.project_name.clone());
        args.push(subcommand.to_string());
        args.extend(extra_args.iter().cloned());
        args
    }
}
