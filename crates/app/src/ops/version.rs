use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct Version;

impl crate::op::Op for Version {
    type Error = std::convert::Infallible;
    type Output = String;

    fn execute(&self, _ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        Ok(format!(
            "{} {} ({})\n\
             - profile: {}\n\
             - target: {}\n\
             - built: {}\n\
             - rustc: {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("REPO_VERSION"),
            env!("BUILD_PROFILE"),
            env!("BUILD_TARGET"),
            env!("BUILD_TIMESTAMP"),
            env!("RUST_VERSION"),
        ))
    }
}
