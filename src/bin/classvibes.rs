use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use classvibes::auth::Credentials;
use classvibes::catalog::CourseListing;
use classvibes::config::{ClientOptions, Config};
use classvibes::courses::CourseForm;
use classvibes::models::{excerpt, Course, Teacher};
use classvibes::subscriptions::SubscribeOutcome;
use classvibes::teachers::{TeacherDeletion, TeacherForm};
use classvibes::ClassVibes;

#[derive(Parser, Debug)]
#[command(name = "classvibes", version)]
#[command(about = "ClassVibes course marketplace client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// File the login session is kept in between runs
    #[arg(long, env = "CLASSVIBES_SESSION_FILE", default_value = ".classvibes-session.json")]
    session_file: PathBuf,

    /// Recovery log of teacher onboardings
    #[arg(long, env = "CLASSVIBES_SAGA_LOG", default_value = ".classvibes-saga.json")]
    saga_log: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in with an account id, username or name
    Login {
        identifier: String,
        #[arg(long, env = "CLASSVIBES_PASSWORD")]
        password: String,
    },
    Logout,
    /// Show the logged-in user
    Whoami,
    /// List all courses with their teacher
    Courses,
    /// List all teachers with their courses
    Teachers,
    /// Show the latest reviews
    Reviews,
    /// Subscribe to a course (students)
    Subscribe { course_id: i64 },
    /// Confirm the payment of a paid course (students)
    Pay { course_id: i64 },
    /// Drop a subscription (students)
    Unsubscribe { course_id: i64 },
    /// List the courses you are subscribed to (students)
    MyCourses,
    /// Manage your courses (teachers)
    #[command(subcommand)]
    Course(CourseCommand),
    /// Manage teachers (admins)
    #[command(subcommand)]
    Teacher(TeacherCommand),
}

#[derive(Subcommand, Debug)]
enum CourseCommand {
    List,
    Show { course_id: i64 },
    Create(CourseArgs),
    Edit {
        course_id: i64,
        #[command(flatten)]
        fields: CourseArgs,
    },
    Delete { course_id: i64 },
}

#[derive(Args, Debug)]
struct CourseArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    price: Option<String>,
    #[arg(long)]
    subject: Option<String>,
    /// Target secondary-school year
    #[arg(long)]
    grade: Option<String>,
    #[arg(long)]
    image_url: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    video_url: Option<String>,
}

impl CourseArgs {
    fn apply(self, form: &mut CourseForm) {
        let fields = [
            (self.name, &mut form.name),
            (self.price, &mut form.price),
            (self.subject, &mut form.subject),
            (self.grade, &mut form.grade),
            (self.image_url, &mut form.image_url),
            (self.description, &mut form.description),
            (self.video_url, &mut form.video_url),
        ];
        for (value, slot) in fields {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }
}

#[derive(Subcommand, Debug)]
enum TeacherCommand {
    List,
    /// Create a teacher with its account and role
    Create(TeacherArgs),
    Update {
        teacher_id: i64,
        #[command(flatten)]
        fields: TeacherArgs,
    },
    /// Delete a teacher and everything that depends on its account
    Delete { teacher_id: i64 },
    /// Roll back onboardings left unfinished
    Recover,
}

#[derive(Args, Debug)]
struct TeacherArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    credential: Option<String>,
    #[arg(long)]
    subject: Option<String>,
    /// Years of experience
    #[arg(long)]
    experience: Option<String>,
    #[arg(long)]
    photo_url: Option<String>,
}

impl TeacherArgs {
    fn apply(self, form: &mut TeacherForm) {
        let fields = [
            (self.name, &mut form.name),
            (self.email, &mut form.email),
            (self.credential, &mut form.credential),
            (self.subject, &mut form.subject),
            (self.experience, &mut form.experience),
            (self.photo_url, &mut form.photo_url),
        ];
        for (value, slot) in fields {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let options = ClientOptions::default()
        .with_session_path(cli.session_file)
        .with_saga_log_path(cli.saga_log);
    let config = Config::from_env()
        .context("set CLASSVIBES_URL and CLASSVIBES_ANON_KEY")?
        .with_options(options);
    let client = ClassVibes::new(config)?;

    match cli.command {
        Commands::Login {
            identifier,
            password,
        } => {
            let user = client
                .auth()
                .login(&Credentials::new(identifier, password))
                .await?;
            println!("Logged in as {} ({})", user.name, user.role);
        }
        Commands::Logout => {
            if client.auth().logout()? {
                println!("Logged out");
            } else {
                println!("Nobody was logged in");
            }
        }
        Commands::Whoami => match client.auth().current_user() {
            Some(user) => {
                println!("{} <{}> role={} id={}", user.name, user.username, user.role, user.id);
                if let Some(teacher_id) = user.teacher_id {
                    println!("teacher id: {}", teacher_id);
                }
            }
            None => println!("Not logged in"),
        },
        Commands::Courses => {
            for listing in client.catalog().courses().await {
                print_listing(&listing);
            }
        }
        Commands::Teachers => {
            for listing in client.catalog().teachers().await {
                print_teacher(&listing.teacher);
                for course in &listing.courses {
                    println!("    - [{}] {}", course.id, course.name);
                }
            }
        }
        Commands::Reviews => {
            for review in client.catalog().reviews().await {
                let author = review
                    .author
                    .as_ref()
                    .and_then(|a| a.name.as_deref())
                    .unwrap_or("anonymous");
                println!("{}: {}", author, excerpt(&review.text, 120));
            }
        }
        Commands::Subscribe { course_id } => {
            match client.subscriptions().subscribe(course_id).await? {
                SubscribeOutcome::Subscribed { course } => {
                    println!("Subscribed to {}", course.name)
                }
                SubscribeOutcome::PaymentRequired { course } => println!(
                    "{} costs ${}; run `classvibes pay {}` to confirm the payment",
                    course.name,
                    course.price.unwrap_or_default(),
                    course.id
                ),
            }
        }
        Commands::Pay { course_id } => {
            let course = client.subscriptions().subscription_summary(course_id).await?;
            println!(
                "Paying ${} for {}...",
                course.price.unwrap_or_default(),
                course.name
            );
            client.subscriptions().confirm_payment(course_id).await?;
            println!("Payment successful, subscribed to {}", course.name);
        }
        Commands::Unsubscribe { course_id } => {
            if client.subscriptions().unsubscribe(course_id).await? {
                println!("Unsubscribed from course {}", course_id);
            } else {
                println!("You were not subscribed to course {}", course_id);
            }
        }
        Commands::MyCourses => {
            for subscription in client.subscriptions().my_subscriptions().await? {
                match &subscription.course {
                    Some(course) => print_course(course),
                    None => println!("[{}] Course {}", subscription.course_id, subscription.course_id),
                }
            }
        }
        Commands::Course(command) => run_course(&client, command).await?,
        Commands::Teacher(command) => run_teacher(&client, command).await?,
    }

    Ok(())
}

async fn run_course(client: &ClassVibes, command: CourseCommand) -> anyhow::Result<()> {
    let editor = client.courses();
    match command {
        CourseCommand::List => {
            for course in editor.list_mine().await? {
                print_course(&course);
            }
        }
        CourseCommand::Show { course_id } => {
            let course = editor.load(course_id).await?;
            print_course(&course);
            if let Some(description) = &course.description {
                println!("    {}", description);
            }
        }
        CourseCommand::Create(fields) => {
            let mut form = CourseForm::default();
            fields.apply(&mut form);
            let course = editor.create(&form).await?;
            println!("Created course {} ({})", course.id, course.name);
        }
        CourseCommand::Edit { course_id, fields } => {
            let mut form = CourseForm::from_course(&editor.load(course_id).await?);
            fields.apply(&mut form);
            let course = editor.update(course_id, &form).await?;
            println!("Updated course {} ({})", course.id, course.name);
        }
        CourseCommand::Delete { course_id } => {
            editor.delete(course_id).await?;
            println!("Deleted course {}", course_id);
        }
    }
    Ok(())
}

async fn run_teacher(client: &ClassVibes, command: TeacherCommand) -> anyhow::Result<()> {
    let admin = client.teachers();
    match command {
        TeacherCommand::List => {
            for teacher in admin.list().await? {
                print_teacher(&teacher);
            }
        }
        TeacherCommand::Create(fields) => {
            let mut form = TeacherForm::default();
            fields.apply(&mut form);
            let outcome = admin.onboard(&form).await?;
            if outcome.replayed {
                println!("Teacher {} was already onboarded", outcome.teacher_id);
            } else {
                println!(
                    "Created teacher {} with account {} (username {})",
                    outcome.teacher_id, outcome.account_id, outcome.username
                );
            }
        }
        TeacherCommand::Update { teacher_id, fields } => {
            let mut form = TeacherForm::from_teacher(&admin.get(teacher_id).await?);
            fields.apply(&mut form);
            let teacher = admin.update(teacher_id, &form).await?;
            println!("Updated teacher {} ({})", teacher.id, teacher.name);
        }
        TeacherCommand::Delete { teacher_id } => match admin.delete(teacher_id).await? {
            TeacherDeletion::AccountCascade => {
                println!("Deleted teacher {} and its account", teacher_id)
            }
            TeacherDeletion::TeacherRowOnly => {
                println!("Deleted teacher {} (no account was linked)", teacher_id)
            }
        },
        TeacherCommand::Recover => {
            let report = admin.recover().await?;
            for email in &report.compensated {
                println!("rolled back: {}", email);
            }
            for email in &report.failed {
                println!("still pending: {}", email);
            }
            if report.compensated.is_empty() && report.failed.is_empty() {
                println!("Nothing to recover");
            }
        }
    }
    Ok(())
}

fn print_course(course: &Course) {
    let price = match course.price {
        Some(price) if price > 0.0 => format!("${}", price),
        _ => "free".to_string(),
    };
    println!(
        "[{}] {} - {} ({})",
        course.id,
        course.name,
        course.subject.as_deref().unwrap_or("-"),
        price
    );
}

fn print_listing(listing: &CourseListing) {
    print_course(&listing.course);
    if let Some(teacher) = &listing.teacher {
        println!("    teacher: {}", teacher.name);
    }
    if listing.subscribed {
        println!("    subscribed");
    }
}

fn print_teacher(teacher: &Teacher) {
    println!(
        "[{}] {} <{}> {} - {} years",
        teacher.id,
        teacher.name,
        teacher.email.as_deref().unwrap_or("-"),
        teacher.subject.as_deref().unwrap_or("-"),
        teacher.experience.unwrap_or_default()
    );
}
