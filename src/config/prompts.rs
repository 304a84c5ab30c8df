//! Prompts sent to the vision-language model.

/// The three questions asked about a game screen.
#[derive(Debug, Clone, Copy)]
pub struct GamePrompts {
    /// Explains the rules and asks for `<action>select(N)</action>`.
    pub decision: &'static str,
    /// Asks whether a card changed color after a tap.
    pub verify: &'static str,
    /// Asks for the score shown on the final screen.
    pub score: &'static str,
}

/// Get the prompt set by language ("cn" or "en").
pub fn get_prompts(lang: &str) -> &'static GamePrompts {
    match lang {
        "en" => &PROMPTS_EN,
        _ => &PROMPTS_ZH,
    }
}

/// Chinese prompts
pub static PROMPTS_ZH: GamePrompts = GamePrompts {
    decision: DECISION_PROMPT_ZH,
    verify: r#"请观察这张游戏截图，判断三个数字卡片中是否有卡片的颜色发生了变化（不再是原来的紫色/蓝色渐变，而是变成了红色、绿色或黄色）？

如果有卡片颜色改变了，回答"是"；如果所有卡片颜色都没变，回答"否"。"#,
    score: r#"请仔细观察这张游戏截图，识别粉色/红色渐变卡片中间的大数字（当前分数）是多少？

只需要回答数字即可，不需要其他说明。"#,
};

/// English prompts
pub static PROMPTS_EN: GamePrompts = GamePrompts {
    decision: DECISION_PROMPT_EN,
    verify: r#"Look at this game screenshot. Has any of the three number cards changed color (no longer the original purple/blue gradient, but red, green or yellow instead)?

Answer "yes" if a card changed color, otherwise answer "no"."#,
    score: r#"Look carefully at this game screenshot. What is the large number (the current score) in the middle of the pink/red gradient card?

Answer with the number only."#,
};

const DECISION_PROMPT_ZH: &str = r#"这是一个数字选择游戏的截图。

游戏规则:
- 屏幕上方有3个指示灯（圆形）
- 绿色灯亮：选择最大的数字 (+10分)
- 红色灯亮：选择最小的数字 (+10分)
- 黄色灯亮：选择中间的数字 (+10分)
- 屏幕中央有3个数字卡片（从左到右排列），分别标记为"选项 a"、"选项 b"、"选项 c"

任务:
1. 识别哪个指示灯是亮的（绿色/红色/黄色）
2. 识别3个数字卡片的数字（选项a、选项b、选项c）
3. 根据亮灯的规则选择正确的数字

请按照以下格式回答:
1. 亮灯颜色: [绿色/红色/黄色]
2. 识别的数字: [选项a的数字, 选项b的数字, 选项c的数字]
3. 应选择: [最大/最小/中间]
4. 选择的索引: N (0=选项a/左边, 1=选项b/中间, 2=选项c/右边)

最后用以下格式输出你的选择:
<action>select(N)</action>

其中 N 是 0、1 或 2。
"#;

const DECISION_PROMPT_EN: &str = r#"This is a screenshot of a number selection game.

Rules:
- There are 3 indicator lights (circles) at the top of the screen
- Green light on: pick the largest number (+10 points)
- Red light on: pick the smallest number (+10 points)
- Yellow light on: pick the middle number (+10 points)
- There are 3 number cards in the middle of the screen (left to right), labelled "option a", "option b", "option c"

Task:
1. Identify which indicator light is on (green/red/yellow)
2. Read the numbers on the 3 cards (option a, option b, option c)
3. Pick the correct number according to the light

Answer in this format:
1. Light color: [green/red/yellow]
2. Numbers: [option a, option b, option c]
3. Pick: [largest/smallest/middle]
4. Index: N (0=option a/left, 1=option b/middle, 2=option c/right)

Finally output your choice as:
<action>select(N)</action>

where N is 0, 1 or 2.
"#;
